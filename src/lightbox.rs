use super::*;

const PLACEHOLDER_TEXT: &str = "写真は準備中です";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageEvent {
    Ignored,
    Hidden,
    PlaceholderShown,
}

#[derive(Debug)]
struct ImageEntry {
    node: NodeId,
    container: usize,
    failed: bool,
}

#[derive(Debug)]
struct ContainerStats {
    node: NodeId,
    total: usize,
    error_count: usize,
    placeholder_shown: bool,
}

#[derive(Debug)]
pub(crate) struct ImageLightbox {
    overlay: Option<NodeId>,
    slot: Option<NodeId>,
    close_control: Option<NodeId>,
    images: Vec<ImageEntry>,
    containers: Vec<ContainerStats>,
}

impl ImageLightbox {
    pub(crate) fn from_document(dom: &Dom) -> Result<Option<Self>> {
        let overlay = dom.by_id("imageModal");
        let slot = dom.by_id("img01");
        let close_control =
            overlay.and_then(|overlay| dom.first_descendant_with_class(overlay, "close"));

        let mut containers = Vec::new();
        for node in dom.query_selector_all(".image-grid, .image-gallery")? {
            containers.push(ContainerStats {
                node,
                total: 0,
                error_count: 0,
                placeholder_shown: false,
            });
        }

        let mut images = Vec::new();
        for node in dom.query_selector_all(".image-grid img, .image-gallery img")? {
            let Some(container) = containers.iter().position(|stats| {
                dom.is_descendant_of(node, stats.node)
            }) else {
                continue;
            };
            containers[container].total += 1;
            images.push(ImageEntry {
                node,
                container,
                failed: false,
            });
        }

        if overlay.is_none() && images.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            overlay,
            slot,
            close_control,
            images,
            containers,
        }))
    }

    pub(crate) fn image_for_target(&self, target: NodeId) -> Option<NodeId> {
        self.images
            .iter()
            .find(|entry| entry.node == target)
            .map(|entry| entry.node)
    }

    // A failed image no longer opens anything; a page without the overlay
    // leaves gallery clicks inert.
    pub(crate) fn open(&self, dom: &mut Dom, image: NodeId) -> Result<bool> {
        if self
            .images
            .iter()
            .any(|entry| entry.node == image && entry.failed)
        {
            return Ok(false);
        }
        let (Some(overlay), Some(slot)) = (self.overlay, self.slot) else {
            return Ok(false);
        };

        dom.style_set(overlay, "display", "block")?;
        let src = dom.attr(image, "src").unwrap_or_default();
        dom.set_attr(slot, "src", &src)?;
        Ok(true)
    }

    pub(crate) fn close(&self, dom: &mut Dom) -> Result<()> {
        if let Some(overlay) = self.overlay {
            dom.style_set(overlay, "display", "none")?;
        }
        Ok(())
    }

    pub(crate) fn is_close_target(&self, dom: &Dom, target: NodeId) -> bool {
        self.close_control
            .is_some_and(|control| control == target || dom.is_descendant_of(target, control))
    }

    pub(crate) fn is_overlay_background(&self, target: NodeId) -> bool {
        self.overlay == Some(target)
    }

    // A load failure is terminal for the image. Once every image in a
    // container has failed, the placeholder note is appended, exactly once.
    pub(crate) fn on_load_failure(&mut self, dom: &mut Dom, image: NodeId) -> Result<ImageEvent> {
        let Some(entry) = self.images.iter_mut().find(|entry| entry.node == image) else {
            return Ok(ImageEvent::Ignored);
        };
        if entry.failed {
            return Ok(ImageEvent::Ignored);
        }
        entry.failed = true;
        let container = entry.container;

        dom.style_set(image, "display", "none")?;

        let stats = &mut self.containers[container];
        stats.error_count += 1;
        if !stats.placeholder_shown && stats.error_count >= stats.total {
            stats.placeholder_shown = true;
            let note = dom.create_detached_element("div".to_string());
            dom.create_text(note, PLACEHOLDER_TEXT.to_string());
            dom.style_set(note, "padding", "12px 0")?;
            dom.style_set(note, "color", "#666")?;
            dom.style_set(note, "font-size", "0.95em")?;
            dom.append_child(stats.node, note)?;
            return Ok(ImageEvent::PlaceholderShown);
        }
        Ok(ImageEvent::Hidden)
    }
}
