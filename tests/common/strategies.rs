use proptest::prelude::*;

/// Outcome a unit leaves behind for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFate {
    /// Marker written and result synthesizes
    Done,
    /// Marker written but synthesis fails
    SynthesisFails,
    /// Estimator errors; the unit leaves a failure marker
    EstimationFails,
}

pub fn item_fate_strategy() -> impl Strategy<Value = ItemFate> {
    prop_oneof![
        6 => Just(ItemFate::Done),
        2 => Just(ItemFate::SynthesisFails),
        2 => Just(ItemFate::EstimationFails),
    ]
}

/// Fates for a run of 1 to 24 items
pub fn run_fates_strategy() -> impl Strategy<Value = Vec<ItemFate>> {
    prop::collection::vec(item_fate_strategy(), 1..24)
}

/// Sizes of successive input arrivals; zero means a poll with no new input
pub fn arrival_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..5, 1..6)
}

pub fn batch_size_strategy() -> impl Strategy<Value = usize> {
    0usize..6
}

/// What an earlier attempt left in the ledger for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leftover {
    Nothing,
    /// Marker written but never confirmed by the scheduler
    Marker,
    /// Marker written and confirmed in the done record
    Confirmed,
}

pub fn leftover_strategy() -> impl Strategy<Value = Leftover> {
    prop_oneof![
        6 => Just(Leftover::Nothing),
        2 => Just(Leftover::Marker),
        2 => Just(Leftover::Confirmed),
    ]
}

/// Leftovers for the first items of a run; extra entries are ignored
pub fn leftovers_strategy() -> impl Strategy<Value = Vec<Leftover>> {
    prop::collection::vec(leftover_strategy(), 0..24)
}
