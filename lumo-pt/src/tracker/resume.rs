//! Resume-target selection
//!
//! Decides which content item a learner lands on when reopening a
//! curriculum. Completion flags decide the item; the exact seek position
//! within the item comes from the position cache on ready.

use crate::curriculum::Curriculum;

/// Index of the content item to resume into
///
/// Scans in sequence order for the first item not yet completed. When
/// every item is completed the curriculum restarts at index 0 (kept for
/// behavioral compatibility; landing on the last item instead would be a
/// product decision).
pub fn resume_target(curriculum: &Curriculum) -> usize {
    curriculum
        .contents
        .iter()
        .position(|item| !item.completed)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::ContentItem;

    fn curriculum_with(completed: &[bool]) -> Curriculum {
        Curriculum {
            id: "c-1".to_string(),
            title: "Test curriculum".to_string(),
            contents: completed
                .iter()
                .enumerate()
                .map(|(i, done)| ContentItem {
                    id: i as i64 + 1,
                    title: format!("Item {}", i + 1),
                    duration_label: "10:00".to_string(),
                    completed: *done,
                    source_ref: format!("video-{}", i + 1),
                    notes: String::new(),
                })
                .collect(),
            progress_percent: 0.0,
        }
    }

    #[test]
    fn test_first_incomplete_wins() {
        let c = curriculum_with(&[true, true, false, false]);
        assert_eq!(resume_target(&c), 2);
    }

    #[test]
    fn test_nothing_watched_starts_at_zero() {
        let c = curriculum_with(&[false, false, false]);
        assert_eq!(resume_target(&c), 0);
    }

    #[test]
    fn test_all_completed_restarts_at_zero() {
        let c = curriculum_with(&[true, true, true]);
        assert_eq!(resume_target(&c), 0);
    }

    #[test]
    fn test_gap_in_completion_resumes_at_gap() {
        let c = curriculum_with(&[true, false, true]);
        assert_eq!(resume_target(&c), 1);
    }

    #[test]
    fn test_empty_curriculum() {
        let c = curriculum_with(&[]);
        assert_eq!(resume_target(&c), 0);
    }
}
