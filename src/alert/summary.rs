//! Natural-language alert sentences.

pub const ZONE_SENTENCE: &str = "Alert! A person has entered the restricted zone!";

/// Turn a model label into a readable equipment name: strip the negation
/// prefix (case-insensitive), turn separators into spaces, capitalise the
/// first letter and lower-case the rest.
pub fn readable_label(label: &str, negation_prefix: &str) -> String {
    let trimmed = label.trim();
    let stripped = if !negation_prefix.is_empty()
        && trimmed.len() >= negation_prefix.len()
        && trimmed.is_char_boundary(negation_prefix.len())
        && trimmed[..negation_prefix.len()].eq_ignore_ascii_case(negation_prefix)
    {
        &trimmed[negation_prefix.len()..]
    } else {
        trimmed
    };
    let spaced = stripped.replace(['_', '-'], " ");
    capitalize(spaced.trim())
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Sentence naming the missing equipment. `None` when nothing is missing.
///
/// One name: `Warning! X not detected.`; two: `Warning! X and Y both are not
/// detected.`; more: an Oxford-comma list, `Warning! A, B, and C are not
/// detected.`
pub fn summary_sentence<S: AsRef<str>>(names: &[S]) -> Option<String> {
    match names {
        [] => None,
        [only] => Some(format!("Warning! {} not detected.", only.as_ref())),
        [first, second] => Some(format!(
            "Warning! {} and {} both are not detected.",
            first.as_ref(),
            second.as_ref()
        )),
        [init @ .., last] => {
            let head = init.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", ");
            Some(format!(
                "Warning! {}, and {} are not detected.",
                head,
                last.as_ref()
            ))
        }
    }
}

/// Readable names for `labels`, de-duplicated in first-seen order.
pub fn readable_names<S: AsRef<str>>(labels: &[S], negation_prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for label in labels {
        let name = readable_label(label.as_ref(), negation_prefix);
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_two_and_many_names() {
        assert_eq!(
            summary_sentence(&["Mask"]).as_deref(),
            Some("Warning! Mask not detected.")
        );
        assert_eq!(
            summary_sentence(&["Mask", "Helmet"]).as_deref(),
            Some("Warning! Mask and Helmet both are not detected.")
        );
        assert_eq!(
            summary_sentence(&["Mask", "Helmet", "Vest"]).as_deref(),
            Some("Warning! Mask, Helmet, and Vest are not detected.")
        );
        assert_eq!(
            summary_sentence(&["Mask", "Helmet", "Vest", "Gloves"]).as_deref(),
            Some("Warning! Mask, Helmet, Vest, and Gloves are not detected.")
        );
        assert_eq!(summary_sentence::<&str>(&[]), None);
    }

    #[test]
    fn labels_become_readable_names() {
        assert_eq!(readable_label("no_helmet", "no_"), "Helmet");
        assert_eq!(readable_label("NO-Hardhat", "no-"), "Hardhat");
        assert_eq!(readable_label("no_safety_vest", "no_"), "Safety vest");
        assert_eq!(readable_label("mask", "no_"), "Mask");
        assert_eq!(readable_label("no_", "no_"), "");
    }

    #[test]
    fn duplicate_labels_collapse() {
        let names = readable_names(&["no_mask", "no_helmet", "no_mask"], "no_");
        assert_eq!(names, vec!["Mask", "Helmet"]);
    }
}
