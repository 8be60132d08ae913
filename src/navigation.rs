use super::*;

pub(crate) const TOC_SCROLL_PAD_PX: i64 = 20;

const BACK_TO_TOP_THRESHOLD_PX: i64 = 300;

#[derive(Debug)]
pub(crate) struct TocDropdown {
    trigger: NodeId,
    panel: NodeId,
    links: Vec<TocLink>,
    is_open: bool,
}

#[derive(Debug)]
struct TocLink {
    node: NodeId,
    target_id: String,
}

impl TocDropdown {
    pub(crate) fn from_document(dom: &Dom) -> Result<Option<Self>> {
        let (Some(trigger), Some(panel)) = (dom.by_id("toc-toggle-btn"), dom.by_id("toc-content"))
        else {
            return Ok(None);
        };

        let mut links = Vec::new();
        for node in dom.descendants(panel) {
            if !dom
                .tag_name(node)
                .is_some_and(|tag| tag.eq_ignore_ascii_case("a"))
            {
                continue;
            }
            let Some(href) = dom.attr(node, "href") else {
                continue;
            };
            let Some(target_id) = href.strip_prefix('#') else {
                continue;
            };
            links.push(TocLink {
                node,
                target_id: target_id.to_string(),
            });
        }

        Ok(Some(Self {
            trigger,
            panel,
            links,
            is_open: false,
        }))
    }

    pub(crate) fn panel(&self) -> NodeId {
        self.panel
    }

    pub(crate) fn is_trigger_target(&self, dom: &Dom, target: NodeId) -> bool {
        self.trigger == target || dom.is_descendant_of(target, self.trigger)
    }

    pub(crate) fn contains(&self, dom: &Dom, target: NodeId) -> bool {
        self.is_trigger_target(dom, target)
            || self.panel == target
            || dom.is_descendant_of(target, self.panel)
    }

    pub(crate) fn link_target(&self, dom: &Dom, target: NodeId) -> Option<String> {
        self.links
            .iter()
            .find(|link| link.node == target || dom.is_descendant_of(target, link.node))
            .map(|link| link.target_id.clone())
    }

    pub(crate) fn toggle(&mut self, dom: &mut Dom) -> Result<bool> {
        if self.is_open {
            self.close_panel(dom)?;
        } else {
            self.is_open = true;
            dom.class_add(self.trigger, "active")?;
            dom.class_add(self.panel, "show")?;
            let height = layout::natural_height(dom, self.panel);
            dom.style_set(self.panel, "max-height", &format!("{height}px"))?;
        }
        Ok(self.is_open)
    }

    pub(crate) fn close_panel(&mut self, dom: &mut Dom) -> Result<bool> {
        if !self.is_open {
            return Ok(false);
        }
        self.is_open = false;
        dom.class_remove(self.trigger, "active")?;
        dom.class_remove(self.panel, "show")?;
        dom.style_set(self.panel, "max-height", "")?;
        Ok(true)
    }
}

#[derive(Debug)]
pub(crate) struct BackToTop {
    button: NodeId,
}

impl BackToTop {
    pub(crate) fn from_document(dom: &Dom) -> Option<Self> {
        dom.by_id("back-to-top").map(|button| Self { button })
    }

    pub(crate) fn is_target(&self, dom: &Dom, target: NodeId) -> bool {
        self.button == target || dom.is_descendant_of(target, self.button)
    }

    pub(crate) fn on_scroll(&self, dom: &mut Dom, scroll_y: i64) -> Result<()> {
        let display = if scroll_y > BACK_TO_TOP_THRESHOLD_PX {
            "block"
        } else {
            "none"
        };
        dom.style_set(self.button, "display", display)?;
        Ok(())
    }
}
