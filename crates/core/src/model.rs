#![forbid(unsafe_code)]

/// Canonical task status. Stored as its `as_str` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Backlog,
    InProgress,
    Done,
    Abandoned,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Backlog => "backlog",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "backlog" => Some(Status::Backlog),
            "in_progress" => Some(Status::InProgress),
            "done" => Some(Status::Done),
            "abandoned" => Some(Status::Abandoned),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recurrence {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    pub fn as_str(self) -> &'static str {
        match self {
            Recurrence::None => "none",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Recurrence::None),
            "daily" => Some(Recurrence::Daily),
            "weekly" => Some(Recurrence::Weekly),
            "monthly" => Some(Recurrence::Monthly),
            _ => None,
        }
    }
}

impl Default for Recurrence {
    fn default() -> Self {
        Recurrence::None
    }
}

/// One committed status transition. Entries are appended in commit order and
/// never rewritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub status: Status,
    pub ts_ms: i64,
    pub note: Option<String>,
}

/// A board stage, consumed for status inference. Lifecycle is owned by the
/// board layer, not the mutation core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub id: String,
    pub name: String,
    pub position: i64,
    pub color: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRecord {
    pub id: String,
    pub version: i64,
    pub title: String,
    pub description: Option<String>,
    pub stage_id: String,
    pub status: Status,
    pub priority: Priority,
    pub effort: Option<i64>,
    pub due_date_ms: Option<i64>,
    pub tags: Vec<String>,
    pub parent_task_id: Option<String>,
    pub recurrence: Recurrence,
    pub archived: bool,
    pub history: Vec<HistoryEntry>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Partial update. Outer `Option` means "present in the patch"; for clearable
/// fields the inner `Option` distinguishes a new value from an explicit clear.
#[derive(Clone, Debug, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub stage_id: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub effort: Option<Option<i64>>,
    pub due_date_ms: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
    pub parent_task_id: Option<Option<String>>,
    pub recurrence: Option<Recurrence>,
    pub archived: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.stage_id.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.effort.is_none()
            && self.due_date_ms.is_none()
            && self.tags.is_none()
            && self.parent_task_id.is_none()
            && self.recurrence.is_none()
            && self.archived.is_none()
    }
}

/// Trim, drop empties, keep first occurrence. Order matters for sub-stage
/// grouping in the board, so this is not a sort.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if out.iter().any(|existing| existing == tag) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            Status::Backlog,
            Status::InProgress,
            Status::Done,
            Status::Abandoned,
        ] {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert_eq!(Status::parse("IN_PROGRESS"), None);
        assert_eq!(Status::parse(""), None);
    }

    #[test]
    fn priority_and_recurrence_defaults() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Recurrence::default(), Recurrence::None);
        assert_eq!(Priority::parse("critical"), Some(Priority::Critical));
        assert_eq!(Recurrence::parse("weekly"), Some(Recurrence::Weekly));
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(TaskPatch::default().is_empty());
        let patch = TaskPatch {
            archived: Some(true),
            ..TaskPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn tags_normalize_preserves_first_occurrence_order() {
        let tags = vec![
            " design ".to_string(),
            "review".to_string(),
            "design".to_string(),
            "".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(normalize_tags(tags), vec!["design", "review"]);
    }
}
