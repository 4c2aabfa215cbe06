//! Position planning
//!
//! The sort column holds a dense `0..k` sequence over the rows a clause
//! selects. Each function here takes a snapshot of those positions and
//! returns the single-row renumberings that keep the sequence dense after
//! the operation. The shifts are ordered so that applying them one at a
//! time never puts two rows on the same position.

/// Renumber the row at `from` to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionShift {
    pub from: i64,
    pub to: i64,
}

impl PositionShift {
    fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }
}

/// A requested position that the current snapshot cannot satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange {
    pub position: i64,
}

/// Shifts to run before inserting, and the position of the new row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    pub position: i64,
    pub shifts: Vec<PositionShift>,
}

/// Park the moving row past the end, close the gap, land it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub park: PositionShift,
    pub shifts: Vec<PositionShift>,
    pub land: PositionShift,
}

impl MovePlan {
    /// Every renumbering in execution order.
    pub fn steps(&self) -> Vec<PositionShift> {
        let mut steps = Vec::with_capacity(self.shifts.len() + 2);
        steps.push(self.park);
        steps.extend(self.shifts.iter().copied());
        steps.push(self.land);
        steps
    }
}

fn descending(positions: &[i64]) -> Vec<i64> {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted
}

fn ascending(positions: &[i64]) -> Vec<i64> {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    sorted
}

/// One past the highest position, or 0 for an empty scope.
pub fn end_position(positions: &[i64]) -> i64 {
    positions.iter().max().map_or(0, |max| max + 1)
}

/// Plan an insert before `requested`; `-1` appends.
///
/// The scan runs from the highest position down and stops at the first
/// row below the insertion point, so every row at or after it moves up
/// by one, highest first.
pub fn plan_insert(positions: &[i64], requested: i64) -> Result<InsertPlan, OutOfRange> {
    let end = end_position(positions);
    let position = match requested {
        -1 => end,
        n if (0..=end).contains(&n) => n,
        n => return Err(OutOfRange { position: n }),
    };

    let shifts = descending(positions)
        .into_iter()
        .take_while(|&p| p >= position)
        .map(|p| PositionShift::new(p, p + 1))
        .collect();

    Ok(InsertPlan { position, shifts })
}

/// Plan the renumbering after the row at `deleted` is gone: every later
/// row moves down by one, lowest first.
pub fn plan_delete(positions: &[i64], deleted: i64) -> Vec<PositionShift> {
    ascending(positions)
        .into_iter()
        .filter(|&p| p > deleted)
        .map(|p| PositionShift::new(p, p - 1))
        .collect()
}

/// Plan moving the row at `from` so it ends up at `to`.
///
/// Returns `Ok(None)` when `from == to`. The moving row is parked one past
/// the end first; the rows it passes over then shift toward the gap it
/// left, scanned in the direction of travel; finally it lands on `to`.
pub fn plan_move(positions: &[i64], from: i64, to: i64) -> Result<Option<MovePlan>, OutOfRange> {
    if from == to {
        return Ok(None);
    }
    if !positions.contains(&from) {
        return Err(OutOfRange { position: from });
    }
    let end = end_position(positions);
    if !(0..end).contains(&to) {
        return Err(OutOfRange { position: to });
    }

    let temp = end;
    let shifts = if from < to {
        ascending(positions)
            .into_iter()
            .filter(|&p| p > from && p <= to)
            .map(|p| PositionShift::new(p, p - 1))
            .collect()
    } else {
        descending(positions)
            .into_iter()
            .filter(|&p| p >= to && p < from)
            .map(|p| PositionShift::new(p, p + 1))
            .collect()
    };

    Ok(Some(MovePlan {
        park: PositionShift::new(from, temp),
        shifts,
        land: PositionShift::new(temp, to),
    }))
}
