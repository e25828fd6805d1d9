//! Cursor watermark and forward-progress rules.
//!
//! A cursor means "records strictly past this identifier" in the scan
//! direction. [`CursorAdvancer`] lands each advance strictly past the
//! previous cursor, so no collection loop can request the same cursor twice
//! in a row. The one exception is the edge of the identifier range: a cursor
//! pinned at `i64::MAX` (ascending) or `i64::MIN` (descending) cannot move,
//! and the advancer reports [`Advance::Exhausted`] so callers stop the scan.

use serde::{Deserialize, Serialize};

use crate::constants::collector::{ASCENDING_START, DESCENDING_START};
use crate::data::{Page, RecordId, ResourceKind, ScanDirection};

/// Integer watermark plus the direction it is read in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    /// Watermark identifier.
    pub position: RecordId,
    /// Scan direction the watermark is interpreted in.
    pub direction: ScanDirection,
}

impl Cursor {
    /// Cursor positioned before the first record of a scan.
    pub fn start(direction: ScanDirection) -> Self {
        let position = match direction {
            ScanDirection::Ascending => ASCENDING_START,
            ScanDirection::Descending => DESCENDING_START,
        };
        Self {
            position,
            direction,
        }
    }

    /// Cursor at `position` for `direction`.
    pub fn at(position: RecordId, direction: ScanDirection) -> Self {
        Self {
            position,
            direction,
        }
    }

    /// Start cursor for the direction `kind` paginates in.
    pub fn start_for(kind: ResourceKind) -> Self {
        Self::start(kind.direction())
    }

    /// Returns `true` when the cursor has not moved from its scan start.
    pub fn is_start(&self) -> bool {
        *self == Self::start(self.direction)
    }

    /// Returns `true` when `id` lies strictly past this cursor.
    pub fn is_past(&self, id: RecordId) -> bool {
        match self.direction {
            ScanDirection::Ascending => id > self.position,
            ScanDirection::Descending => id < self.position,
        }
    }

    /// Cursor moved `step` identifiers further along the scan.
    ///
    /// Saturates at the end of the identifier range, so the result equals
    /// `self` once [`Cursor::is_exhausted`] holds.
    pub fn jumped(&self, step: i64) -> Self {
        let position = match self.direction {
            ScanDirection::Ascending => self.position.saturating_add(step),
            ScanDirection::Descending => self.position.saturating_sub(step),
        };
        Self {
            position,
            direction: self.direction,
        }
    }

    /// Returns `true` when no identifier lies past this cursor.
    pub fn is_exhausted(&self) -> bool {
        match self.direction {
            ScanDirection::Ascending => self.position == RecordId::MAX,
            ScanDirection::Descending => self.position == RecordId::MIN,
        }
    }
}

/// How an advance was decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// The page frontier moved the cursor.
    Frontier,
    /// The page was empty; a gap jump was applied.
    EmptyGap,
    /// The frontier did not pass the cursor; a gap jump was applied.
    Stalled,
    /// The cursor sits at the end of the identifier range and cannot move.
    Exhausted,
}

/// Computes the next cursor from the last page fetched.
#[derive(Clone, Copy, Debug)]
pub struct CursorAdvancer {
    kind: ResourceKind,
    gap_jump_step: i64,
}

impl CursorAdvancer {
    /// Advancer for `kind` using `gap_jump_step` for forced jumps.
    pub fn new(kind: ResourceKind, gap_jump_step: i64) -> Self {
        Self {
            kind,
            gap_jump_step: gap_jump_step.max(1),
        }
    }

    /// Next cursor after `last_page` was fetched at `current`.
    pub fn advance(&self, current: Cursor, last_page: &Page) -> Cursor {
        self.advance_explained(current, last_page).0
    }

    /// Like [`CursorAdvancer::advance`], also reporting which rule applied.
    ///
    /// The frontier is the identifier of the last record in the page; records
    /// without a readable identifier are skipped when locating it.
    pub fn advance_explained(&self, current: Cursor, last_page: &Page) -> (Cursor, Advance) {
        if last_page.is_empty() {
            return self.jump(current, Advance::EmptyGap);
        }
        let frontier = last_page
            .records
            .iter()
            .rev()
            .find_map(|record| record.id(self.kind));
        self.advance_to(current, frontier)
    }

    /// Move to `candidate` if it passes `current`, otherwise gap-jump.
    ///
    /// A frontier may land on the range edge; the next forced jump from
    /// there reports [`Advance::Exhausted`].
    pub fn advance_to(&self, current: Cursor, candidate: Option<RecordId>) -> (Cursor, Advance) {
        match candidate {
            Some(id) if current.is_past(id) => {
                (Cursor::at(id, current.direction), Advance::Frontier)
            }
            _ => self.jump(current, Advance::Stalled),
        }
    }

    fn jump(&self, current: Cursor, how: Advance) -> (Cursor, Advance) {
        if current.is_exhausted() {
            return (current, Advance::Exhausted);
        }
        (current.jumped(self.gap_jump_step), how)
    }
}
