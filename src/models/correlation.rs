// Outcome of one best-effort correlation step

/// Result of attaching optional metadata to a process record.
/// `Failed` carries a reason for logs and display; it never aborts a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation<T> {
    Found(T),
    Absent,
    Failed(String),
}

impl<T> Correlation<T> {
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Correlation::Failed(reason.to_string())
    }

    pub fn found(self) -> Option<T> {
        match self {
            Correlation::Found(v) => Some(v),
            Correlation::Absent | Correlation::Failed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn found_drops_absent_and_failed() {
        assert_eq!(Correlation::Found(3).found(), Some(3));
        assert_eq!(Correlation::<i32>::Absent.found(), None);
        assert_eq!(Correlation::<i32>::failed("boom").found(), None);
    }

    #[test]
    fn failed_keeps_reason_text() {
        let c: Correlation<i32> = Correlation::failed(std::io::Error::other("timeout"));
        assert_eq!(c, Correlation::Failed("timeout".into()));
    }
}
