use super::*;

use unicode_normalization::UnicodeNormalization;

pub(crate) const SEARCH_DEBOUNCE_MS: i64 = 150;
pub(crate) const SEARCH_SCROLL_PAD_PX: i64 = 16;

const NO_RESULTS_TEXT: &str = "該当なし";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub visible_count: usize,
    pub matched: Vec<SectionId>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ScrollRequest {
    pub(crate) target: NodeId,
    pub(crate) after_transition_of: Option<NodeId>,
    pub(crate) pad: i64,
}

#[derive(Debug)]
pub(crate) struct FilterPass {
    pub(crate) outcome: SearchOutcome,
    pub(crate) height_changes: Vec<NodeId>,
    pub(crate) scroll: Option<ScrollRequest>,
}

#[derive(Debug)]
pub(crate) struct SearchFilter {
    input: NodeId,
    result_info: NodeId,
    sections: Vec<SectionId>,
    pending_task: Option<i64>,
}

impl SearchFilter {
    pub(crate) fn from_document(
        dom: &mut Dom,
        accordion: Option<&AccordionController>,
    ) -> Result<Option<Self>> {
        let Some(input) = dom.by_id("searchInput") else {
            return Ok(None);
        };

        let sections = accordion
            .map(|accordion| accordion.plain_section_ids())
            .unwrap_or_default();

        let result_info = match dom.by_id("search-result-info") {
            Some(node) => node,
            None => {
                let node = dom.create_detached_element("div".to_string());
                dom.set_attr(node, "id", "search-result-info")?;
                dom.style_set(node, "margin", "8px 0 0")?;
                dom.style_set(node, "font-size", "0.9em")?;
                let parent = dom
                    .find_ancestor_with_class(input, "search-container")
                    .or_else(|| dom.parent(input))
                    .ok_or_else(|| {
                        Error::StructuralMismatch("search input has no parent".into())
                    })?;
                dom.append_child(parent, node)?;
                node
            }
        };

        Ok(Some(Self {
            input,
            result_info,
            sections,
            pending_task: None,
        }))
    }

    pub(crate) fn input(&self) -> NodeId {
        self.input
    }

    pub(crate) fn set_pending_task(&mut self, task_id: i64) {
        self.pending_task = Some(task_id);
    }

    pub(crate) fn take_pending_task(&mut self) -> Option<i64> {
        self.pending_task.take()
    }

    pub(crate) fn clear_pending_task(&mut self) {
        self.pending_task = None;
    }

    // An empty query shows every section and leaves open state alone.
    pub(crate) fn apply(
        &self,
        dom: &mut Dom,
        accordion: &mut Option<AccordionController>,
        query: &str,
        want_scroll: bool,
    ) -> Result<FilterPass> {
        let normalized_query = normalize_text(query.trim());

        let mut visible_count = 0usize;
        let mut matched = Vec::new();
        let mut height_changes = Vec::new();
        let mut first_match: Option<(bool, NodeId, NodeId)> = None;

        for &section in &self.sections {
            let accordion = accordion
                .as_mut()
                .ok_or_else(|| Error::Runtime("search sections without an accordion".into()))?;
            let (item, header, _content) = {
                let entry = accordion.section(section)?;
                (entry.item, entry.header, entry.content)
            };

            let haystack = normalize_text(&collapse_whitespace(&dom.text_content(item)));
            let is_match = normalized_query.is_empty() || haystack.contains(&normalized_query);

            dom.style_set(item, "display", if is_match { "" } else { "none" })?;

            if !normalized_query.is_empty() {
                let mode = if is_match { Toggle::Open } else { Toggle::Closed };
                let outcome = accordion.toggle(dom, section, mode)?;
                if outcome.changed {
                    height_changes.push(outcome.content);
                }
                if is_match && first_match.is_none() {
                    first_match = Some((outcome.changed, header, outcome.content));
                }
            }

            if is_match {
                visible_count += 1;
                matched.push(section);
            }
        }

        let text = if normalized_query.is_empty() {
            String::new()
        } else if visible_count == 0 {
            NO_RESULTS_TEXT.to_string()
        } else {
            format!("{visible_count}件ヒット")
        };
        dom.set_text_content(self.result_info, &text)?;

        let scroll = if want_scroll {
            first_match.map(|(had_to_open, header, content)| ScrollRequest {
                target: header,
                after_transition_of: had_to_open.then_some(content),
                pad: SEARCH_SCROLL_PAD_PX,
            })
        } else {
            None
        };

        Ok(FilterPass {
            outcome: SearchOutcome {
                visible_count,
                matched,
            },
            height_changes,
            scroll,
        })
    }
}

#[derive(Debug)]
struct YearEntry {
    item: NodeId,
    year: NodeId,
    sub: Option<NodeId>,
}

// Narrow filter variant: matches only the header's year span and sub-text,
// and only toggles visibility.
#[derive(Debug)]
pub(crate) struct YearFilter {
    input: NodeId,
    entries: Vec<YearEntry>,
}

impl YearFilter {
    pub(crate) fn from_document(
        dom: &Dom,
        accordion: Option<&AccordionController>,
    ) -> Result<Option<Self>> {
        let Some(input) = dom.by_id("yearSearch") else {
            return Ok(None);
        };

        let mut entries = Vec::new();
        if let Some(accordion) = accordion {
            for section in accordion.plain_section_ids() {
                let entry = accordion.section(section)?;
                let first_child = dom
                    .children(entry.header)
                    .find(|&child| dom.tag_name(child).is_some());
                let year = match first_child {
                    Some(child)
                        if dom
                            .tag_name(child)
                            .is_some_and(|tag| tag.eq_ignore_ascii_case("span")) =>
                    {
                        child
                    }
                    _ => {
                        return Err(Error::StructuralMismatch(format!(
                            "year filter header without a leading span: {}",
                            truncate_chars(&dom.dump_node(entry.header), 200)
                        )));
                    }
                };
                let sub = dom.first_descendant_with_class(entry.header, "sub-text");
                entries.push(YearEntry {
                    item: entry.item,
                    year,
                    sub,
                });
            }
        }

        Ok(Some(Self { input, entries }))
    }

    pub(crate) fn input(&self) -> NodeId {
        self.input
    }

    pub(crate) fn apply(&self, dom: &mut Dom, query: &str) -> Result<usize> {
        let term = normalize_text(query);
        let mut visible = 0usize;

        for entry in &self.entries {
            let year_text = normalize_text(&collapse_whitespace(&dom.text_content(entry.year)));
            let sub_text = entry
                .sub
                .map(|sub| normalize_text(&collapse_whitespace(&dom.text_content(sub))))
                .unwrap_or_default();

            let is_match =
                term.is_empty() || year_text.contains(&term) || sub_text.contains(&term);
            dom.style_set(entry.item, "display", if is_match { "" } else { "none" })?;
            if is_match {
                visible += 1;
            }
        }

        Ok(visible)
    }
}

pub(crate) fn normalize_text(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
