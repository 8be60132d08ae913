use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Open,
    Closed,
    Flip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionStyle {
    Plain,
    Lyrics,
}

#[derive(Debug)]
pub(crate) struct Section {
    pub(crate) item: NodeId,
    pub(crate) header: NodeId,
    pub(crate) content: NodeId,
    style: SectionStyle,
    is_open: bool,
    measured_height: i64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ToggleOutcome {
    pub(crate) changed: bool,
    pub(crate) content: NodeId,
}

#[derive(Debug)]
pub(crate) struct AccordionController {
    sections: Vec<Section>,
}

impl AccordionController {
    pub(crate) fn from_document(dom: &mut Dom) -> Result<Option<Self>> {
        let mut sections = Vec::new();

        // Song sections are wired only through the lyrics variant below.
        for item in dom.query_selector_all(".accordion-item")? {
            if dom.class_contains(item, "song-section")
                || dom.find_ancestor_with_class(item, "song-section").is_some()
            {
                continue;
            }
            let header = dom
                .first_descendant_with_class(item, "accordion-header")
                .ok_or_else(|| {
                    Error::StructuralMismatch(format!(
                        "accordion item without a header: {}",
                        truncate_chars(&dom.dump_node(item), 200)
                    ))
                })?;
            let content = dom
                .first_descendant_with_class(item, "accordion-content")
                .ok_or_else(|| {
                    Error::StructuralMismatch(format!(
                        "accordion item without a content body: {}",
                        truncate_chars(&dom.dump_node(item), 200)
                    ))
                })?;
            sections.push(Section {
                item,
                header,
                content,
                style: SectionStyle::Plain,
                is_open: false,
                measured_height: 0,
            });
        }

        for song in dom.query_selector_all(".song-section")? {
            let header = dom
                .first_descendant_with_class(song, "accordion-header")
                .or_else(|| dom.first_descendant_by_tag(song, "h3"))
                .ok_or_else(|| {
                    Error::StructuralMismatch(format!(
                        "song section without a header: {}",
                        truncate_chars(&dom.dump_node(song), 200)
                    ))
                })?;
            let content = dom
                .first_descendant_with_class(song, "lyrics-content")
                .or_else(|| dom.next_element_sibling(header))
                .ok_or_else(|| {
                    Error::StructuralMismatch(format!(
                        "song section without a lyrics body: {}",
                        truncate_chars(&dom.dump_node(song), 200)
                    ))
                })?;
            sections.push(Section {
                item: song,
                header,
                content,
                style: SectionStyle::Lyrics,
                is_open: false,
                measured_height: 0,
            });
        }

        if sections.is_empty() {
            return Ok(None);
        }

        for section in &mut sections {
            section.measured_height = layout::natural_height(dom, section.content);
        }

        let mut controller = Self { sections };

        // Headers marked active in the markup start open.
        let pre_open = controller
            .sections
            .iter()
            .enumerate()
            .filter(|(_, section)| dom.class_contains(section.header, "active"))
            .map(|(index, _)| SectionId(index))
            .collect::<Vec<_>>();
        for section in pre_open {
            controller.toggle(dom, section, Toggle::Open)?;
        }

        Ok(Some(controller))
    }

    pub(crate) fn toggle(
        &mut self,
        dom: &mut Dom,
        section: SectionId,
        mode: Toggle,
    ) -> Result<ToggleOutcome> {
        let count = self.sections.len();
        let entry = self.sections.get_mut(section.0).ok_or_else(|| {
            Error::InvalidReference(format!(
                "section id {} out of range (sections: {count})",
                section.0
            ))
        })?;

        let open = match mode {
            Toggle::Open => {
                if entry.is_open {
                    return Ok(ToggleOutcome {
                        changed: false,
                        content: entry.content,
                    });
                }
                true
            }
            Toggle::Closed => {
                if !entry.is_open {
                    return Ok(ToggleOutcome {
                        changed: false,
                        content: entry.content,
                    });
                }
                false
            }
            Toggle::Flip => !entry.is_open,
        };

        let header = entry.header;
        let item = entry.item;
        let content = entry.content;
        let style = entry.style;

        if open {
            // Natural height is re-measured at toggle time, not wiring time.
            let measured = layout::natural_height(dom, content);
            entry.measured_height = measured;
            entry.is_open = true;
            dom.class_add(header, "active")?;
            dom.class_add(item, "active")?;
            if style == SectionStyle::Lyrics {
                dom.style_set(content, "padding", "20px")?;
                dom.style_set(content, "opacity", "1")?;
            }
            dom.style_set(content, "max-height", &format!("{measured}px"))?;
        } else {
            entry.is_open = false;
            dom.class_remove(header, "active")?;
            dom.class_remove(item, "active")?;
            match style {
                SectionStyle::Plain => dom.style_set(content, "max-height", "")?,
                SectionStyle::Lyrics => {
                    dom.style_set(content, "max-height", "0px")?;
                    dom.style_set(content, "padding", "0 20px")?;
                    dom.style_set(content, "opacity", "0")?;
                }
            }
        }

        Ok(ToggleOutcome {
            changed: true,
            content,
        })
    }

    pub(crate) fn section(&self, section: SectionId) -> Result<&Section> {
        self.sections.get(section.0).ok_or_else(|| {
            Error::InvalidReference(format!(
                "section id {} out of range (sections: {})",
                section.0,
                self.sections.len()
            ))
        })
    }

    pub(crate) fn is_open(&self, section: SectionId) -> Result<bool> {
        self.section(section).map(|entry| entry.is_open)
    }

    pub(crate) fn measured_height(&self, section: SectionId) -> Result<i64> {
        self.section(section).map(|entry| entry.measured_height)
    }

    pub(crate) fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub(crate) fn plain_section_ids(&self) -> Vec<SectionId> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, section)| section.style == SectionStyle::Plain)
            .map(|(index, _)| SectionId(index))
            .collect()
    }

    pub(crate) fn section_for_header(&self, dom: &Dom, target: NodeId) -> Option<SectionId> {
        self.sections
            .iter()
            .position(|section| {
                section.header == target || dom.is_descendant_of(target, section.header)
            })
            .map(SectionId)
    }

    pub(crate) fn section_with_header_in(&self, dom: &Dom, container: NodeId) -> Option<SectionId> {
        self.sections
            .iter()
            .position(|section| {
                section.header == container || dom.is_descendant_of(section.header, container)
            })
            .map(SectionId)
    }

    pub(crate) fn visible_count(&self, dom: &Dom) -> usize {
        self.sections
            .iter()
            .filter(|section| dom.is_displayed(section.item))
            .count()
    }
}
