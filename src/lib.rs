use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::fmt;

mod accordion;
mod html;
mod layout;
mod lightbox;
mod navigation;
mod search;
mod selector;
#[cfg(test)]
mod tests;

pub use accordion::{SectionId, Toggle};
pub use search::SearchOutcome;

use accordion::AccordionController;
use lightbox::{ImageEvent, ImageLightbox};
use navigation::{BackToTop, TocDropdown};
use search::{ScrollRequest, SearchFilter, YearFilter};
use selector::{SelectorStep, parse_selector_groups};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    Runtime(String),
    StructuralMismatch(String),
    InvalidReference(String),
    SelectorNotFound(String),
    UnsupportedSelector(String),
    TypeMismatch {
        selector: String,
        expected: String,
        actual: String,
    },
    AssertionFailed {
        selector: String,
        expected: String,
        actual: String,
        dom_snippet: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::Runtime(msg) => write!(f, "runtime error: {msg}"),
            Self::StructuralMismatch(msg) => write!(f, "structural mismatch: {msg}"),
            Self::InvalidReference(msg) => write!(f, "invalid reference: {msg}"),
            Self::SelectorNotFound(selector) => write!(f, "selector not found: {selector}"),
            Self::UnsupportedSelector(selector) => write!(f, "unsupported selector: {selector}"),
            Self::TypeMismatch {
                selector,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch for {selector}: expected {expected}, actual {actual}"
            ),
            Self::AssertionFailed {
                selector,
                expected,
                actual,
                dom_snippet,
            } => write!(
                f,
                "assertion failed for {selector}: expected {expected}, actual {actual}, snippet {dom_snippet}"
            ),
        }
    }
}

impl StdError for Error {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum NodeKindRef<'a> {
    Document,
    Element,
    Text(&'a str),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    node_type: NodeType,
}

#[derive(Debug, Clone)]
struct Element {
    tag_name: String,
    attrs: HashMap<String, String>,
    value: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Dom {
    nodes: Vec<Node>,
    pub(crate) root: NodeId,
    id_index: HashMap<String, NodeId>,
}

impl Dom {
    pub(crate) fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            id_index: HashMap::new(),
        }
    }

    fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            node_type,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    pub(crate) fn create_element(
        &mut self,
        parent: NodeId,
        tag_name: String,
        attrs: HashMap<String, String>,
    ) -> NodeId {
        let value = attrs.get("value").cloned().unwrap_or_default();
        let element = Element {
            tag_name,
            attrs,
            value,
        };
        let id = self.create_node(Some(parent), NodeType::Element(element));
        if let Some(id_attr) = self
            .element(id)
            .and_then(|element| element.attrs.get("id").cloned())
        {
            self.id_index.insert(id_attr, id);
        }
        id
    }

    pub(crate) fn create_detached_element(&mut self, tag_name: String) -> NodeId {
        let element = Element {
            tag_name,
            attrs: HashMap::new(),
            value: String::new(),
        };
        self.create_node(None, NodeType::Element(element))
    }

    pub(crate) fn create_text(&mut self, parent: NodeId, text: String) -> NodeId {
        self.create_node(Some(parent), NodeType::Text(text))
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.element(parent).is_none() && parent != self.root {
            return Err(Error::Runtime("append target is not an element".into()));
        }
        if self.nodes[child.0].parent.is_some() {
            return Err(Error::Runtime("appended node already has a parent".into()));
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        if let Some(id_attr) = self
            .element(child)
            .and_then(|element| element.attrs.get("id").cloned())
        {
            self.id_index.insert(id_attr, child);
        }
        Ok(())
    }

    fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes[node_id.0].node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node_id.0].node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn node_type(&self, node_id: NodeId) -> NodeKindRef<'_> {
        match &self.nodes[node_id.0].node_type {
            NodeType::Document => NodeKindRef::Document,
            NodeType::Element(_) => NodeKindRef::Element,
            NodeType::Text(text) => NodeKindRef::Text(text),
        }
    }

    pub(crate) fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|e| e.tag_name.as_str())
    }

    pub(crate) fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes[node_id.0].parent
    }

    pub(crate) fn children(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[node_id.0].children.iter().copied()
    }

    pub(crate) fn is_descendant_of(&self, node_id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.parent(node_id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub(crate) fn by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    pub(crate) fn attr(&self, node_id: NodeId, name: &str) -> Option<String> {
        self.element(node_id).and_then(|e| e.attrs.get(name).cloned())
    }

    pub(crate) fn set_attr(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Runtime("attribute target is not an element".into()))?;
        element.attrs.insert(name.to_string(), value.to_string());
        if name == "id" {
            self.id_index.insert(value.to_string(), node_id);
        }
        Ok(())
    }

    pub(crate) fn value(&self, node_id: NodeId) -> Result<String> {
        self.element(node_id)
            .map(|e| e.value.clone())
            .ok_or_else(|| Error::Runtime("value target is not an element".into()))
    }

    pub(crate) fn set_value(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Runtime("value target is not an element".into()))?;
        element.value = value.to_string();
        Ok(())
    }

    pub(crate) fn text_content(&self, node_id: NodeId) -> String {
        stacker::maybe_grow(64 * 1024, 1024 * 1024, || {
            match &self.nodes[node_id.0].node_type {
                NodeType::Document | NodeType::Element(_) => {
                    let mut out = String::new();
                    for child in &self.nodes[node_id.0].children {
                        out.push_str(&self.text_content(*child));
                    }
                    out
                }
                NodeType::Text(text) => text.clone(),
            }
        })
    }

    pub(crate) fn set_text_content(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        if self.element(node_id).is_none() {
            return Err(Error::Runtime("text content target is not an element".into()));
        }
        self.nodes[node_id.0].children.clear();
        if !value.is_empty() {
            self.create_text(node_id, value.to_string());
        }
        Ok(())
    }

    pub(crate) fn style_get(&self, node_id: NodeId, property: &str) -> Option<String> {
        let element = self.element(node_id)?;
        let decls = parse_style_declarations(element.attrs.get("style").map(String::as_str));
        decls
            .into_iter()
            .find(|(prop, _)| prop == property)
            .map(|(_, value)| value)
    }

    pub(crate) fn style_set(&mut self, node_id: NodeId, property: &str, value: &str) -> Result<()> {
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Runtime("style target is not an element".into()))?;

        let mut decls = parse_style_declarations(element.attrs.get("style").map(String::as_str));
        if let Some(pos) = decls.iter().position(|(prop, _)| prop == property) {
            if value.is_empty() {
                decls.remove(pos);
            } else {
                decls[pos].1 = value.to_string();
            }
        } else if !value.is_empty() {
            decls.push((property.to_string(), value.to_string()));
        }

        if decls.is_empty() {
            element.attrs.remove("style");
        } else {
            element
                .attrs
                .insert("style".to_string(), serialize_style_declarations(&decls));
        }

        Ok(())
    }

    pub(crate) fn is_displayed(&self, node_id: NodeId) -> bool {
        let mut cursor = Some(node_id);
        while let Some(current) = cursor {
            if self.style_get(current, "display").as_deref() == Some("none") {
                return false;
            }
            cursor = self.parent(current);
        }
        true
    }

    pub(crate) fn class_contains(&self, node_id: NodeId, class_name: &str) -> bool {
        self.element(node_id)
            .map(|element| has_class(element, class_name))
            .unwrap_or(false)
    }

    pub(crate) fn class_add(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Runtime("class target is not an element".into()))?;
        let mut classes = class_tokens(element.attrs.get("class").map(String::as_str));
        if !classes.iter().any(|name| name == class_name) {
            classes.push(class_name.to_string());
        }
        set_class_attr(element, &classes);
        Ok(())
    }

    pub(crate) fn class_remove(&mut self, node_id: NodeId, class_name: &str) -> Result<()> {
        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Runtime("class target is not an element".into()))?;
        let mut classes = class_tokens(element.attrs.get("class").map(String::as_str));
        classes.retain(|name| name != class_name);
        set_class_attr(element, &classes);
        Ok(())
    }

    pub(crate) fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        let all = self.query_selector_all(selector)?;
        Ok(all.into_iter().next())
    }

    pub(crate) fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let groups = parse_selector_groups(selector)?;

        if groups.len() == 1 && groups[0].len() == 1 {
            if let Some(id) = groups[0][0].id_only() {
                return Ok(self.by_id(id).into_iter().collect());
            }
        }

        let mut ids = Vec::new();
        self.collect_elements_dfs(self.root, &mut ids);

        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        for candidate in ids {
            if groups
                .iter()
                .any(|steps| self.matches_selector_chain(candidate, steps))
                && seen.insert(candidate)
            {
                matched.push(candidate);
            }
        }
        Ok(matched)
    }

    fn collect_elements_dfs(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        stacker::maybe_grow(64 * 1024, 1024 * 1024, || {
            if self.element(node_id).is_some() {
                out.push(node_id);
            }
            for child in &self.nodes[node_id.0].children {
                self.collect_elements_dfs(*child, out);
            }
        })
    }

    fn matches_selector_chain(&self, node_id: NodeId, steps: &[SelectorStep]) -> bool {
        let Some((last, rest)) = steps.split_last() else {
            return false;
        };
        if !self.matches_step(node_id, last) {
            return false;
        }

        let mut remaining = rest;
        let mut cursor = self.parent(node_id);
        while let Some(step) = remaining.last() {
            let Some(current) = cursor else {
                return false;
            };
            if self.matches_step(current, step) {
                remaining = &remaining[..remaining.len() - 1];
            }
            cursor = self.parent(current);
        }
        true
    }

    fn matches_step(&self, node_id: NodeId, step: &SelectorStep) -> bool {
        let Some(element) = self.element(node_id) else {
            return false;
        };
        if let Some(tag) = &step.tag {
            if !element.tag_name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &step.id {
            if element.attrs.get("id") != Some(id) {
                return false;
            }
        }
        step.classes
            .iter()
            .all(|class_name| has_class(element, class_name))
    }

    pub(crate) fn first_by_tag(&self, tag: &str) -> Option<NodeId> {
        let mut ids = Vec::new();
        self.collect_elements_dfs(self.root, &mut ids);
        ids.into_iter()
            .find(|id| self.tag_name(*id).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
    }

    pub(crate) fn first_descendant_with_class(
        &self,
        root: NodeId,
        class_name: &str,
    ) -> Option<NodeId> {
        let mut ids = Vec::new();
        self.collect_elements_dfs(root, &mut ids);
        ids.into_iter()
            .filter(|id| *id != root)
            .find(|id| self.class_contains(*id, class_name))
    }

    pub(crate) fn first_descendant_by_tag(&self, root: NodeId, tag: &str) -> Option<NodeId> {
        let mut ids = Vec::new();
        self.collect_elements_dfs(root, &mut ids);
        ids.into_iter()
            .filter(|id| *id != root)
            .find(|id| self.tag_name(*id).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
    }

    pub(crate) fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.collect_elements_dfs(root, &mut ids);
        ids.retain(|id| *id != root);
        ids
    }

    pub(crate) fn find_ancestor_with_class(
        &self,
        node_id: NodeId,
        class_name: &str,
    ) -> Option<NodeId> {
        let mut cursor = self.parent(node_id);
        while let Some(current) = cursor {
            if self.class_contains(current, class_name) {
                return Some(current);
            }
            cursor = self.parent(current);
        }
        None
    }

    pub(crate) fn next_element_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent(node_id)?;
        let siblings = &self.nodes[parent.0].children;
        let pos = siblings.iter().position(|id| *id == node_id)?;
        siblings[pos + 1..]
            .iter()
            .copied()
            .find(|id| self.element(*id).is_some())
    }

    pub(crate) fn dump_node(&self, node_id: NodeId) -> String {
        match &self.nodes[node_id.0].node_type {
            NodeType::Document => {
                let mut out = String::new();
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.dump_node(*child));
                }
                out
            }
            NodeType::Text(text) => text.clone(),
            NodeType::Element(element) => {
                let mut out = String::new();
                out.push('<');
                out.push_str(&element.tag_name);
                for (k, v) in &element.attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(v);
                    out.push('"');
                }
                out.push('>');
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.dump_node(*child));
                }
                if !html::is_void_tag(&element.tag_name) {
                    out.push_str("</");
                    out.push_str(&element.tag_name);
                    out.push('>');
                }
                out
            }
        }
    }
}

fn class_tokens(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn has_class(element: &Element, class_name: &str) -> bool {
    class_tokens(element.attrs.get("class").map(String::as_str))
        .iter()
        .any(|name| name == class_name)
}

fn set_class_attr(element: &mut Element, classes: &[String]) {
    if classes.is_empty() {
        element.attrs.remove("class");
    } else {
        element.attrs.insert("class".to_string(), classes.join(" "));
    }
}

fn parse_style_declarations(raw: Option<&str>) -> Vec<(String, String)> {
    let mut decls = Vec::new();
    for chunk in raw.unwrap_or_default().split(';') {
        let Some((prop, value)) = chunk.split_once(':') else {
            continue;
        };
        let prop = prop.trim().to_lowercase();
        let value = value.trim().to_string();
        if !prop.is_empty() && !value.is_empty() {
            decls.push((prop, value));
        }
    }
    decls
}

fn serialize_style_declarations(decls: &[(String, String)]) -> String {
    decls
        .iter()
        .map(|(prop, value)| format!("{prop}: {value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = text.chars().take(max_chars).collect::<String>();
    out.push('…');
    out
}

pub(crate) const DEFAULT_TRANSITION_MS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    DebouncedSearch,
    TransitionEnd { node: NodeId },
}

impl TaskKind {
    fn label(&self) -> &'static str {
        match self {
            Self::DebouncedSearch => "search",
            Self::TransitionEnd { .. } => "transition",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledTask {
    id: i64,
    due_at: i64,
    order: i64,
    kind: TaskKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTaskKind {
    Search,
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTask {
    pub id: i64,
    pub due_at: i64,
    pub order: i64,
    pub kind: PendingTaskKind,
}

#[derive(Debug, Clone, Copy)]
struct ScrollFollowUp {
    target: NodeId,
    pad: i64,
}

#[derive(Debug)]
pub struct Page {
    dom: Dom,
    accordion: Option<AccordionController>,
    lightbox: Option<ImageLightbox>,
    search: Option<SearchFilter>,
    year_filter: Option<YearFilter>,
    toc: Option<TocDropdown>,
    back_to_top: Option<BackToTop>,
    scroll_y: i64,
    task_queue: Vec<ScheduledTask>,
    transition_follow_ups: Vec<(NodeId, ScrollFollowUp)>,
    now_ms: i64,
    task_step_limit: usize,
    transition_ms: i64,
    next_task_id: i64,
    next_task_order: i64,
    trace: bool,
    trace_events: bool,
    trace_timers: bool,
    trace_widgets: bool,
    trace_logs: Vec<String>,
    trace_log_limit: usize,
    trace_to_stderr: bool,
}

impl Page {
    pub fn from_html(html: &str) -> Result<Self> {
        let mut dom = html::parse_html(html)?;

        let accordion = AccordionController::from_document(&mut dom)?;
        let lightbox = ImageLightbox::from_document(&dom)?;
        let search = SearchFilter::from_document(&mut dom, accordion.as_ref())?;
        let year_filter = YearFilter::from_document(&dom, accordion.as_ref())?;
        let toc = TocDropdown::from_document(&dom)?;
        let back_to_top = BackToTop::from_document(&dom);

        Ok(Self {
            dom,
            accordion,
            lightbox,
            search,
            year_filter,
            toc,
            back_to_top,
            scroll_y: 0,
            task_queue: Vec::new(),
            transition_follow_ups: Vec::new(),
            now_ms: 0,
            task_step_limit: 10_000,
            transition_ms: DEFAULT_TRANSITION_MS,
            next_task_id: 1,
            next_task_order: 0,
            trace: false,
            trace_events: true,
            trace_timers: true,
            trace_widgets: true,
            trace_logs: Vec::new(),
            trace_log_limit: 10_000,
            trace_to_stderr: true,
        })
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace_logs)
    }

    pub fn set_trace_stderr(&mut self, enabled: bool) {
        self.trace_to_stderr = enabled;
    }

    pub fn set_trace_events(&mut self, enabled: bool) {
        self.trace_events = enabled;
    }

    pub fn set_trace_timers(&mut self, enabled: bool) {
        self.trace_timers = enabled;
    }

    pub fn set_trace_widgets(&mut self, enabled: bool) {
        self.trace_widgets = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::Runtime(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.trace_log_limit = max_entries;
        while self.trace_logs.len() > self.trace_log_limit {
            self.trace_logs.remove(0);
        }
        Ok(())
    }

    pub fn set_task_step_limit(&mut self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::Runtime(
                "set_task_step_limit requires at least 1 step".into(),
            ));
        }
        self.task_step_limit = max_steps;
        Ok(())
    }

    pub fn set_transition_duration_ms(&mut self, duration_ms: i64) -> Result<()> {
        if duration_ms < 0 {
            return Err(Error::Runtime(
                "set_transition_duration_ms requires non-negative milliseconds".into(),
            ));
        }
        self.transition_ms = duration_ms;
        Ok(())
    }

    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    pub fn window_scroll_y(&self) -> i64 {
        self.scroll_y
    }

    pub fn click(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.trace_event_line(format!("[event] click selector={selector}"));
        self.click_node(target)
    }

    fn click_node(&mut self, target: NodeId) -> Result<()> {
        // Trigger clicks stop propagation; the outside-close handler below
        // never sees them.
        if let Some(toc) = self.toc.as_mut() {
            if toc.is_trigger_target(&self.dom, target) {
                let open = toc.toggle(&mut self.dom)?;
                let panel = toc.panel();
                self.trace_widget_line(format!("[widget] toc toggle open={open}"));
                self.note_height_transition(panel);
                return Ok(());
            }
        }

        let mut handled = false;

        if let Some(accordion) = self.accordion.as_mut() {
            if let Some(section) = accordion.section_for_header(&self.dom, target) {
                let outcome = accordion.toggle(&mut self.dom, section, Toggle::Flip)?;
                let now_open = accordion.is_open(section)?;
                self.trace_widget_line(format!(
                    "[widget] accordion toggle section={} open={now_open}",
                    section.0
                ));
                if outcome.changed {
                    self.note_height_transition(outcome.content);
                }
                handled = true;
            }
        }

        if !handled {
            if let Some(lightbox) = self.lightbox.as_mut() {
                if let Some(image) = lightbox.image_for_target(target) {
                    let opened = lightbox.open(&mut self.dom, image)?;
                    self.trace_widget_line(format!("[widget] lightbox open accepted={opened}"));
                    handled = true;
                } else if lightbox.is_close_target(&self.dom, target)
                    || lightbox.is_overlay_background(target)
                {
                    lightbox.close(&mut self.dom)?;
                    self.trace_widget_line("[widget] lightbox close".into());
                    handled = true;
                }
            }
        }

        if !handled {
            if let Some(toc) = self.toc.as_ref() {
                if let Some(target_id) = toc.link_target(&self.dom, target) {
                    self.select_toc_link(&target_id)?;
                    handled = true;
                }
            }
        }

        if !handled {
            if let Some(back_to_top) = self.back_to_top.as_ref() {
                if back_to_top.is_target(&self.dom, target) {
                    self.trace_widget_line("[widget] back-to-top activate".into());
                    self.scroll_window_to(0)?;
                }
            }
        }

        if let Some(toc) = self.toc.as_mut() {
            if !toc.contains(&self.dom, target) && toc.close_panel(&mut self.dom)? {
                let panel = toc.panel();
                self.trace_widget_line("[widget] toc outside close".into());
                self.note_height_transition(panel);
            }
        }

        Ok(())
    }

    pub fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let tag = self
            .dom
            .tag_name(target)
            .ok_or_else(|| Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "input or textarea".into(),
                actual: "non-element".into(),
            })?
            .to_ascii_lowercase();

        if tag != "input" && tag != "textarea" {
            return Err(Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "input or textarea".into(),
                actual: tag,
            });
        }

        self.dom.set_value(target, text)?;
        self.trace_event_line(format!("[event] input selector={selector}"));
        self.route_input_event(target)
    }

    fn route_input_event(&mut self, target: NodeId) -> Result<()> {
        if self.search.as_ref().is_some_and(|s| s.input() == target) {
            self.debounce_search_pass();
            return Ok(());
        }
        if self.year_filter.as_ref().is_some_and(|f| f.input() == target) {
            self.run_year_filter_pass()?;
        }
        Ok(())
    }

    pub fn press_key(&mut self, selector: &str, key: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.trace_event_line(format!("[event] keydown selector={selector} key={key}"));

        if key == "Enter" && self.search.as_ref().is_some_and(|s| s.input() == target) {
            self.cancel_pending_search();
            self.run_filter_pass(true)?;
        }
        Ok(())
    }

    pub fn scroll_window_to(&mut self, y: i64) -> Result<()> {
        self.scroll_y = y.max(0);
        self.trace_event_line(format!("[event] scroll y={}", self.scroll_y));
        if let Some(back_to_top) = self.back_to_top.as_ref() {
            back_to_top.on_scroll(&mut self.dom, self.scroll_y)?;
        }
        Ok(())
    }

    pub fn fail_image(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let tag = self
            .dom
            .tag_name(target)
            .unwrap_or_default()
            .to_ascii_lowercase();
        if tag != "img" {
            return Err(Error::TypeMismatch {
                selector: selector.to_string(),
                expected: "img".into(),
                actual: tag,
            });
        }

        self.trace_event_line(format!("[event] error selector={selector}"));
        if let Some(lightbox) = self.lightbox.as_mut() {
            match lightbox.on_load_failure(&mut self.dom, target)? {
                ImageEvent::Ignored => {}
                ImageEvent::Hidden => {
                    self.trace_widget_line("[widget] lightbox image hidden".into());
                }
                ImageEvent::PlaceholderShown => {
                    self.trace_widget_line("[widget] lightbox placeholder shown".into());
                }
            }
        }
        Ok(())
    }

    pub fn toggle_section(&mut self, section: SectionId, mode: Toggle) -> Result<()> {
        let accordion = self
            .accordion
            .as_mut()
            .ok_or_else(|| Error::InvalidReference("page has no accordion sections".into()))?;
        let outcome = accordion.toggle(&mut self.dom, section, mode)?;
        let now_open = accordion.is_open(section)?;
        self.trace_widget_line(format!(
            "[widget] accordion toggle section={} open={now_open}",
            section.0
        ));
        if outcome.changed {
            self.note_height_transition(outcome.content);
        }
        Ok(())
    }

    pub fn apply_search(&mut self, query: &str) -> Result<SearchOutcome> {
        let search = self
            .search
            .as_ref()
            .ok_or_else(|| Error::Runtime("page has no search input".into()))?;
        let input = search.input();
        self.dom.set_value(input, query)?;
        self.cancel_pending_search();
        let outcome = self.run_filter_pass(true)?;
        outcome.ok_or_else(|| Error::Runtime("page has no search input".into()))
    }

    pub fn section_count(&self) -> usize {
        self.accordion
            .as_ref()
            .map(|accordion| accordion.section_count())
            .unwrap_or(0)
    }

    pub fn is_section_open(&self, section: SectionId) -> Result<bool> {
        let accordion = self
            .accordion
            .as_ref()
            .ok_or_else(|| Error::InvalidReference("page has no accordion sections".into()))?;
        accordion.is_open(section)
    }

    pub fn section_measured_height(&self, section: SectionId) -> Result<i64> {
        let accordion = self
            .accordion
            .as_ref()
            .ok_or_else(|| Error::InvalidReference("page has no accordion sections".into()))?;
        accordion.measured_height(section)
    }

    pub fn visible_section_count(&self) -> usize {
        let Some(accordion) = self.accordion.as_ref() else {
            return 0;
        };
        accordion.visible_count(&self.dom)
    }

    pub fn pending_tasks(&self) -> Vec<PendingTask> {
        let mut tasks = self
            .task_queue
            .iter()
            .map(|task| PendingTask {
                id: task.id,
                due_at: task.due_at,
                order: task.order,
                kind: match task.kind {
                    TaskKind::DebouncedSearch => PendingTaskKind::Search,
                    TaskKind::TransitionEnd { .. } => PendingTaskKind::Transition,
                },
            })
            .collect::<Vec<_>>();
        tasks.sort_by_key(|task| (task.due_at, task.order));
        tasks
    }

    pub fn advance_time(&mut self, delta_ms: i64) -> Result<()> {
        if delta_ms < 0 {
            return Err(Error::Runtime(
                "advance_time requires non-negative milliseconds".into(),
            ));
        }
        let from = self.now_ms;
        self.now_ms = self.now_ms.saturating_add(delta_ms);
        let ran = self.run_due_tasks_internal()?;
        self.trace_timer_line(format!(
            "[timer] advance delta_ms={} from={} to={} ran_due={}",
            delta_ms, from, self.now_ms, ran
        ));
        Ok(())
    }

    pub fn advance_time_to(&mut self, target_ms: i64) -> Result<()> {
        if target_ms < self.now_ms {
            return Err(Error::Runtime(format!(
                "advance_time_to requires target >= now_ms (target={target_ms}, now_ms={})",
                self.now_ms
            )));
        }
        let from = self.now_ms;
        self.now_ms = target_ms;
        let ran = self.run_due_tasks_internal()?;
        self.trace_timer_line(format!(
            "[timer] advance_to from={} to={} ran_due={}",
            from, self.now_ms, ran
        ));
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        let from = self.now_ms;
        let ran = self.run_task_queue(None, true)?;
        self.trace_timer_line(format!(
            "[timer] flush from={} to={} ran={}",
            from, self.now_ms, ran
        ));
        Ok(())
    }

    fn run_due_tasks_internal(&mut self) -> Result<usize> {
        self.run_task_queue(Some(self.now_ms), false)
    }

    fn run_task_queue(&mut self, due_limit: Option<i64>, advance_clock: bool) -> Result<usize> {
        let mut steps = 0usize;
        while let Some(next_idx) = self.next_task_index(due_limit) {
            steps += 1;
            if steps > self.task_step_limit {
                return Err(self.task_step_limit_error(self.task_step_limit, steps, due_limit));
            }
            let task = self.task_queue.remove(next_idx);
            if advance_clock && task.due_at > self.now_ms {
                self.now_ms = task.due_at;
            }
            self.execute_task(task)?;
        }
        Ok(steps)
    }

    fn task_step_limit_error(
        &self,
        max_steps: usize,
        steps: usize,
        due_limit: Option<i64>,
    ) -> Error {
        let due_limit_desc = due_limit
            .map(|value| value.to_string())
            .unwrap_or_else(|| "none".into());
        Error::Runtime(format!(
            "flush exceeded max task steps: limit={max_steps}, steps={steps}, now_ms={}, due_limit={}, pending_tasks={}",
            self.now_ms,
            due_limit_desc,
            self.task_queue.len()
        ))
    }

    fn next_task_index(&self, due_limit: Option<i64>) -> Option<usize> {
        self.task_queue
            .iter()
            .enumerate()
            .filter(|(_, task)| {
                if let Some(limit) = due_limit {
                    task.due_at <= limit
                } else {
                    true
                }
            })
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)
    }

    fn execute_task(&mut self, task: ScheduledTask) -> Result<()> {
        self.trace_timer_line(format!(
            "[timer] run id={} due_at={} kind={} now_ms={}",
            task.id,
            task.due_at,
            task.kind.label(),
            self.now_ms
        ));

        match task.kind {
            TaskKind::DebouncedSearch => {
                if let Some(search) = self.search.as_mut() {
                    search.clear_pending_task();
                }
                self.run_filter_pass(true)?;
            }
            TaskKind::TransitionEnd { node } => {
                let mut follow_ups = Vec::new();
                self.transition_follow_ups.retain(|(waiting_on, follow_up)| {
                    if *waiting_on == node {
                        follow_ups.push(*follow_up);
                        false
                    } else {
                        true
                    }
                });
                for follow_up in follow_ups {
                    self.scroll_to_node(follow_up.target, follow_up.pad)?;
                }
            }
        }
        Ok(())
    }

    fn schedule_task(&mut self, kind: TaskKind, delay_ms: i64) -> i64 {
        let id = self.next_task_id;
        self.next_task_id += 1;
        let order = self.next_task_order;
        self.next_task_order += 1;
        let due_at = self.now_ms.saturating_add(delay_ms.max(0));
        self.trace_timer_line(format!(
            "[timer] schedule id={id} due_at={due_at} kind={}",
            kind.label()
        ));
        self.task_queue.push(ScheduledTask {
            id,
            due_at,
            order,
            kind,
        });
        id
    }

    fn clear_task(&mut self, task_id: i64) -> bool {
        let before = self.task_queue.len();
        self.task_queue.retain(|task| task.id != task_id);
        let existed = self.task_queue.len() != before;
        if existed {
            self.trace_timer_line(format!("[timer] clear id={task_id}"));
        }
        existed
    }

    // A restarted transition replaces the pending completion signal for the
    // same node, never queues a second one.
    fn note_height_transition(&mut self, node: NodeId) {
        self.task_queue
            .retain(|task| task.kind != TaskKind::TransitionEnd { node });
        self.schedule_task(TaskKind::TransitionEnd { node }, self.transition_ms);
    }

    fn debounce_search_pass(&mut self) {
        let pending = self
            .search
            .as_mut()
            .and_then(|search| search.take_pending_task());
        if let Some(task_id) = pending {
            self.clear_task(task_id);
        }
        let task_id = self.schedule_task(TaskKind::DebouncedSearch, search::SEARCH_DEBOUNCE_MS);
        if let Some(search) = self.search.as_mut() {
            search.set_pending_task(task_id);
        }
    }

    fn cancel_pending_search(&mut self) {
        let pending = self
            .search
            .as_mut()
            .and_then(|search| search.take_pending_task());
        if let Some(task_id) = pending {
            self.clear_task(task_id);
        }
    }

    fn run_filter_pass(&mut self, want_scroll: bool) -> Result<Option<SearchOutcome>> {
        let Some(search) = self.search.as_ref() else {
            return Ok(None);
        };
        let query = self.dom.value(search.input())?;
        let pass = search.apply(&mut self.dom, &mut self.accordion, &query, want_scroll)?;

        self.trace_widget_line(format!(
            "[widget] search apply query={:?} visible={} matched={}",
            query,
            pass.outcome.visible_count,
            pass.outcome.matched.len()
        ));

        for node in pass.height_changes {
            self.note_height_transition(node);
        }
        if let Some(request) = pass.scroll {
            self.handle_scroll_request(request)?;
        }
        Ok(Some(pass.outcome))
    }

    fn run_year_filter_pass(&mut self) -> Result<()> {
        let Some(filter) = self.year_filter.as_ref() else {
            return Ok(());
        };
        let query = self.dom.value(filter.input())?;
        let visible = filter.apply(&mut self.dom, &query)?;
        self.trace_widget_line(format!(
            "[widget] year filter query={query:?} visible={visible}"
        ));
        Ok(())
    }

    fn handle_scroll_request(&mut self, request: ScrollRequest) -> Result<()> {
        match request.after_transition_of {
            Some(node) => {
                self.transition_follow_ups.push((
                    node,
                    ScrollFollowUp {
                        target: request.target,
                        pad: request.pad,
                    },
                ));
                Ok(())
            }
            None => self.scroll_to_node(request.target, request.pad),
        }
    }

    fn scroll_to_node(&mut self, target: NodeId, pad: i64) -> Result<()> {
        let top = layout::document_top(&self.dom, target);
        let nav = layout::nav_height(&self.dom);
        self.scroll_window_to(top - nav - pad)
    }

    fn select_toc_link(&mut self, target_id: &str) -> Result<()> {
        if let Some(toc) = self.toc.as_mut() {
            if toc.close_panel(&mut self.dom)? {
                let panel = toc.panel();
                self.note_height_transition(panel);
            }
        }
        self.trace_widget_line(format!("[widget] toc select target={target_id}"));

        // A dangling anchor is a quiet no-op, never an error.
        let Some(target_el) = self.dom.by_id(target_id) else {
            return Ok(());
        };
        let Some(accordion) = self.accordion.as_mut() else {
            return Ok(());
        };
        let Some(section) = accordion.section_with_header_in(&self.dom, target_el) else {
            return Ok(());
        };

        let outcome = if accordion.is_open(section)? {
            None
        } else {
            Some(accordion.toggle(&mut self.dom, section, Toggle::Open)?)
        };

        match outcome {
            Some(outcome) => {
                self.note_height_transition(outcome.content);
                self.transition_follow_ups.push((
                    outcome.content,
                    ScrollFollowUp {
                        target: target_el,
                        pad: navigation::TOC_SCROLL_PAD_PX,
                    },
                ));
            }
            None => self.scroll_to_node(target_el, navigation::TOC_SCROLL_PAD_PX)?,
        }
        Ok(())
    }

    pub fn assert_text(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.text_content(target);
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_value(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.value(target)?;
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_exists(&self, selector: &str) -> Result<()> {
        let _ = self.select_one(selector)?;
        Ok(())
    }

    pub fn assert_displayed(&self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        if !self.dom.is_displayed(target) {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: "displayed".into(),
                actual: "hidden".into(),
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_hidden(&self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        if self.dom.is_displayed(target) {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: "hidden".into(),
                actual: "displayed".into(),
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn style_value(&self, selector: &str, property: &str) -> Result<Option<String>> {
        let target = self.select_one(selector)?;
        Ok(self.dom.style_get(target, property))
    }

    pub fn attr_value(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let target = self.select_one(selector)?;
        Ok(self.dom.attr(target, name))
    }

    pub fn dump_dom(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        Ok(self.dom.dump_node(target))
    }

    fn select_one(&self, selector: &str) -> Result<NodeId> {
        self.dom
            .query_selector(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
    }

    fn node_snippet(&self, node_id: NodeId) -> String {
        truncate_chars(&self.dom.dump_node(node_id), 200)
    }

    fn trace_event_line(&mut self, line: String) {
        if self.trace && self.trace_events {
            self.trace_line(line);
        }
    }

    fn trace_timer_line(&mut self, line: String) {
        if self.trace && self.trace_timers {
            self.trace_line(line);
        }
    }

    fn trace_widget_line(&mut self, line: String) {
        if self.trace && self.trace_widgets {
            self.trace_line(line);
        }
    }

    fn trace_line(&mut self, line: String) {
        if self.trace {
            if self.trace_to_stderr {
                eprintln!("{line}");
            }
            if self.trace_logs.len() >= self.trace_log_limit {
                self.trace_logs.remove(0);
            }
            self.trace_logs.push(line);
        }
    }
}
