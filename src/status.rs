//! Status bitfield returned by the runtime query API.
//!
//! Mirrors the Detour status convention: the top three bits classify the
//! result (`FAILURE`/`SUCCESS`/`IN_PROGRESS`), the low 24 bits carry detail
//! flags that refine it. Callers combine `FAILURE | <detail>` or
//! `SUCCESS | <detail>` rather than returning a plain enum, so a caller can
//! check `status.is_success()` without matching on every detail flag.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Status: u32 {
        const FAILURE = 1 << 31;
        const SUCCESS = 1 << 30;
        const IN_PROGRESS = 1 << 29;

        const WRONG_MAGIC = 1 << 0;
        const WRONG_VERSION = 1 << 1;
        const OUT_OF_MEMORY = 1 << 2;
        const INVALID_PARAM = 1 << 3;
        const BUFFER_TOO_SMALL = 1 << 4;
        const OUT_OF_NODES = 1 << 5;
        const PARTIAL_RESULT = 1 << 6;
    }
}

const DETAIL_MASK: u32 = 0x00ff_ffff;

impl Status {
    #[inline]
    pub fn is_success(self) -> bool {
        self.contains(Status::SUCCESS)
    }

    #[inline]
    pub fn is_failure(self) -> bool {
        self.contains(Status::FAILURE)
    }

    #[inline]
    pub fn in_progress(self) -> bool {
        self.contains(Status::IN_PROGRESS)
    }

    /// The low 24 detail bits, with the three classification bits masked out.
    #[inline]
    pub fn detail(self) -> Status {
        Status::from_bits_truncate(self.bits() & DETAIL_MASK)
    }

    #[inline]
    pub fn success() -> Status {
        Status::SUCCESS
    }

    #[inline]
    pub fn failure(detail: Status) -> Status {
        Status::FAILURE | detail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_classification_and_detail() {
        let status = Status::SUCCESS | Status::PARTIAL_RESULT;
        assert!(status.is_success());
        assert!(!status.is_failure());
        assert_eq!(status.detail(), Status::PARTIAL_RESULT);
    }

    #[test]
    fn failure_helper_sets_both_bits() {
        let status = Status::failure(Status::INVALID_PARAM);
        assert!(status.is_failure());
        assert_eq!(status.detail(), Status::INVALID_PARAM);
    }
}
