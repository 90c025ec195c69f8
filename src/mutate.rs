use crate::parse::parse_note;

/// Rewrite the status character of the `index`-th task-list checkbox,
/// leaving every other byte of `content` untouched. Ordinals are counted
/// by the same scan the extractor uses for rendering, so render-time and
/// mutation-time positions cannot drift apart.
///
/// Returns `None` when `index` is out of range for the current content.
pub(crate) fn set_checkbox(content: &str, index: usize, checked: bool) -> Option<String> {
    let tasks = parse_note(content).tasks;
    let task = tasks.get(index)?;

    let mut out = String::with_capacity(content.len());
    out.push_str(&content[..task.marker_offset]);
    out.push(if checked { 'x' } else { ' ' });
    out.push_str(&content[task.marker_offset + 1..]);
    Some(out)
}

/// Number of task-list checkboxes in `content`, for staleness checks.
pub(crate) fn checkbox_count(content: &str) -> usize {
    parse_note(content).tasks.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "# Todo\n\n- [ ] first\nsome text [x] not a task\n- [x] second\n  - [ ] nested\n";

    #[test]
    fn toggling_flips_exactly_one_marker() {
        let toggled = set_checkbox(NOTE, 0, true).unwrap();
        assert_eq!(
            toggled,
            "# Todo\n\n- [x] first\nsome text [x] not a task\n- [x] second\n  - [ ] nested\n"
        );
        // Everything except the single marker byte is identical.
        assert_eq!(toggled.len(), NOTE.len());
        let diffs: Vec<usize> = NOTE
            .bytes()
            .zip(toggled.bytes())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(diffs.len(), 1);
    }

    #[test]
    fn unchecking_works_and_is_idempotent() {
        let unchecked = set_checkbox(NOTE, 1, false).unwrap();
        assert!(unchecked.contains("- [ ] second"));
        assert_eq!(set_checkbox(&unchecked, 1, false).as_deref(), Some(unchecked.as_str()));
    }

    #[test]
    fn nested_items_count_in_document_order() {
        let toggled = set_checkbox(NOTE, 2, true).unwrap();
        assert!(toggled.contains("  - [x] nested"));
    }

    #[test]
    fn out_of_range_returns_none() {
        assert!(set_checkbox(NOTE, 3, true).is_none());
        assert_eq!(checkbox_count(NOTE), 3);
    }

    #[test]
    fn inline_checkbox_lookalikes_are_never_touched() {
        let toggled = set_checkbox(NOTE, 1, false).unwrap();
        assert!(toggled.contains("some text [x] not a task"));
    }

    #[test]
    fn code_fence_checkboxes_are_not_counted() {
        let note = "```\n- [ ] fake\n```\n- [ ] real\n";
        assert_eq!(checkbox_count(note), 1);
        let toggled = set_checkbox(note, 0, true).unwrap();
        assert!(toggled.contains("- [ ] fake"));
        assert!(toggled.contains("- [x] real"));
    }
}
