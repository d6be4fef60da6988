/// Generation counter for fetches.
///
/// Each fetch takes a number from [`issue`](Self::issue) when it starts. When
/// it completes, [`try_apply`](Self::try_apply) accepts it only if nothing
/// newer has been applied yet, so a slow response can never overwrite the
/// result of a later request that finished first.
#[derive(Debug, Default, Clone)]
pub struct RequestSequence {
    issued: u64,
    applied: Option<u64>,
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Mark `seq` as applied if it is newer than the last applied one.
    pub fn try_apply(&mut self, seq: u64) -> bool {
        if self.applied.is_some_and(|applied| seq <= applied) {
            return false;
        }
        self.applied = Some(seq);
        true
    }

    pub fn latest_issued(&self) -> u64 {
        self.issued
    }

    pub fn latest_applied(&self) -> Option<u64> {
        self.applied
    }
}
