use std::collections::VecDeque;

/// How many past riddles are remembered and excluded from new generations.
pub const HISTORY_LIMIT: usize = 10;

/// Ordered record of recently seen riddle texts, oldest first.
#[derive(Debug, Clone, Default)]
pub struct RiddleHistory {
    entries: VecDeque<String>,
}

impl RiddleHistory {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// Records a riddle text as the newest entry.
    ///
    /// A text already present is moved to the back instead of being stored
    /// twice. Entries beyond [`HISTORY_LIMIT`] are evicted from the front.
    pub fn record(&mut self, riddle_text: &str) {
        if let Some(pos) = self.entries.iter().position(|e| e == riddle_text) {
            self.entries.remove(pos);
        }
        self.entries.push_back(riddle_text.to_string());
        while self.entries.len() > HISTORY_LIMIT {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}
