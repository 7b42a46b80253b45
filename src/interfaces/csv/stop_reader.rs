use crate::domain::stop::Stop;
use crate::error::{Result, TicketingError};
use std::io::Read;

/// Reads the stop catalogue from a CSV source.
///
/// Expected header: `route_id, name, order, fare`, where `fare` is the
/// cumulative fare from the route origin. Whitespace around fields is
/// trimmed.
pub struct StopReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> StopReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes stops, one `Result` per row.
    pub fn stops(self) -> impl Iterator<Item = Result<Stop>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(TicketingError::from))
    }
}
