/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProgress {
    pub level: u32,
    pub total_levels: u32,
    pub questions_in_level: usize,
    pub answered_in_level: usize,
    pub remaining_in_level: usize,
    pub correct_in_level: u32,
    pub total_correct: u32,
    pub total_answered: u32,
    /// Share of levels already cleared, in `[0, 1]`.
    pub levels_cleared: f64,
}

impl SessionProgress {
    /// "1 Question" / "3 Questions", as shown next to the level counter.
    #[must_use]
    pub fn remaining_label(&self) -> String {
        if self.remaining_in_level == 1 {
            "1 Question".to_owned()
        } else {
            format!("{} Questions", self.remaining_in_level)
        }
    }
}
