use super::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SelectorStep {
    pub(crate) tag: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
}

impl SelectorStep {
    pub(crate) fn id_only(&self) -> Option<&str> {
        if self.tag.is_none() && self.classes.is_empty() {
            self.id.as_deref()
        } else {
            None
        }
    }
}

// Supported grammar: tag, #id, .class, compound steps, whitespace descendant
// combinators and comma-separated groups. Everything else is unsupported.
pub(crate) fn parse_selector_groups(selector: &str) -> Result<Vec<Vec<SelectorStep>>> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }

    let mut groups = Vec::new();
    for group in selector.split(',') {
        let group = group.trim();
        if group.is_empty() {
            return Err(Error::UnsupportedSelector(selector.into()));
        }

        let mut steps = Vec::new();
        for token in group.split_whitespace() {
            steps.push(parse_selector_step(selector, token)?);
        }
        if steps.is_empty() {
            return Err(Error::UnsupportedSelector(selector.into()));
        }
        groups.push(steps);
    }

    Ok(groups)
}

fn parse_selector_step(selector: &str, token: &str) -> Result<SelectorStep> {
    let mut step = SelectorStep::default();
    let chars = token.chars().collect::<Vec<_>>();
    let mut i = 0usize;

    if i < chars.len() && is_name_char(chars[i]) {
        let start = i;
        while i < chars.len() && is_name_char(chars[i]) {
            i += 1;
        }
        step.tag = Some(chars[start..i].iter().collect::<String>().to_lowercase());
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                let name = take_name(&chars, &mut i);
                if name.is_empty() || step.id.is_some() {
                    return Err(Error::UnsupportedSelector(selector.into()));
                }
                step.id = Some(name);
            }
            '.' => {
                i += 1;
                let name = take_name(&chars, &mut i);
                if name.is_empty() {
                    return Err(Error::UnsupportedSelector(selector.into()));
                }
                step.classes.push(name);
            }
            _ => return Err(Error::UnsupportedSelector(selector.into())),
        }
    }

    if step.tag.is_none() && step.id.is_none() && step.classes.is_empty() {
        return Err(Error::UnsupportedSelector(selector.into()));
    }

    Ok(step)
}

fn take_name(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && is_name_char(chars[*i]) {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}
