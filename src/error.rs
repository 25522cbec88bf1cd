/// Failures the bus driver can report to its caller.
///
/// None of these are fatal: the acquisition cycle treats every variant as
/// "no fresh data this cycle" and retries on the next scheduled cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The data-line pin itself failed.
    Pin(E),
    /// A reset pulse drew no presence response; no device is reachable.
    BusTimeout,
    /// A received address or scratchpad did not fold to CRC 0.
    ChecksumMismatch,
}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Error::Pin(err)
    }
}
