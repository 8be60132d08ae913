use super::*;

pub(crate) const LINE_HEIGHT_PX: i64 = 24;

// The scrollHeight analog: a data-height attribute wins, otherwise children
// stack. The element's own max-height clamp is ignored, a child's is not.
pub(crate) fn natural_height(dom: &Dom, node_id: NodeId) -> i64 {
    stacker::maybe_grow(64 * 1024, 1024 * 1024, || {
        if let Some(value) = dom
            .attr(node_id, "data-height")
            .and_then(|raw| parse_px(&raw))
        {
            return value;
        }

        let mut total = 0i64;
        for child in dom.children(node_id) {
            match dom.node_type(child) {
                NodeKindRef::Element => total += rendered_height(dom, child),
                NodeKindRef::Text(text) => {
                    total += text_line_count(text) * LINE_HEIGHT_PX;
                }
                NodeKindRef::Document => {}
            }
        }
        total
    })
}

// The stylesheet collapses accordion/lyrics bodies and the dropdown panel to
// zero height by default; without an inline max-height they render collapsed.
pub(crate) fn rendered_height(dom: &Dom, node_id: NodeId) -> i64 {
    if dom.style_get(node_id, "display").as_deref() == Some("none") {
        return 0;
    }

    let clamp = match dom
        .style_get(node_id, "max-height")
        .and_then(|raw| parse_px(&raw))
    {
        Some(value) => Some(value),
        None if is_collapsed_by_default(dom, node_id) => Some(0),
        None => None,
    };

    let natural = natural_height(dom, node_id);
    match clamp {
        Some(value) => natural.min(value),
        None => natural,
    }
}

fn is_collapsed_by_default(dom: &Dom, node_id: NodeId) -> bool {
    dom.class_contains(node_id, "accordion-content")
        || dom.class_contains(node_id, "lyrics-content")
        || dom.attr(node_id, "id").as_deref() == Some("toc-content")
}

pub(crate) fn document_top(dom: &Dom, node_id: NodeId) -> i64 {
    let Some(parent) = dom.parent(node_id) else {
        return 0;
    };

    let mut top = document_top(dom, parent);
    for sibling in dom.children(parent) {
        if sibling == node_id {
            break;
        }
        match dom.node_type(sibling) {
            NodeKindRef::Element => top += rendered_height(dom, sibling),
            NodeKindRef::Text(text) => top += text_line_count(text) * LINE_HEIGHT_PX,
            NodeKindRef::Document => {}
        }
    }
    top
}

pub(crate) fn nav_height(dom: &Dom) -> i64 {
    match dom.first_by_tag("nav") {
        Some(nav) => rendered_height(dom, nav),
        None => 0,
    }
}

pub(crate) fn parse_px(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    let digits = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
    digits.parse::<i64>().ok()
}

fn text_line_count(text: &str) -> i64 {
    text.lines().filter(|line| !line.trim().is_empty()).count() as i64
}
