use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag of one run. Set by the display loop on a quit key or by
/// the hand-off stage when the queue breaks; polled by every stage.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        thread::spawn(move || token.cancel()).join().unwrap();
        assert!(other.is_cancelled());
    }
}
