use thiserror::Error;

/// Errors surfaced by the log engine. Marked non-exhaustive so future chip
/// variants can add conditions without breaking the API; most callers only need
/// to handle `StorageFull` and `LogNotFound`, the rest indicate a board-level
/// problem.
#[derive(Error, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The density code read from the device ID is not one this driver knows,
    /// which in practice means no chip is fitted (a floating bus reads 0xFF).
    #[error("storage device not detected")]
    DeviceAbsent,

    /// The ready bit never asserted within the poll budget. A dead chip and a
    /// wedged one are indistinguishable from the bus side; both end up here.
    #[error("storage device unresponsive")]
    DeviceUnresponsive,

    /// The write cursor ran off the end of storage with overwrite disabled.
    /// Terminal for the session; the data already committed stays valid.
    #[error("storage full")]
    StorageFull,

    /// No page on flash carries the requested log number. Either it never
    /// existed or wraparound overwrote it completely.
    #[error("log not found")]
    LogNotFound,

    /// Page address outside `1..=num_pages`. The top page is reserved for
    /// volume metadata and is not directly addressable through a cursor.
    #[error("page address out of range")]
    InvalidPage,
}
