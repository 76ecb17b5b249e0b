use super::{codec::S7Value, protocol::ErrorKind};

/// Per-point outcome of one acquisition cycle
pub type PointValue = Result<S7Value, ErrorKind>;

/// Receiver of acquisition and write results.
///
/// Every point of a cycle gets exactly one `update`, every write call exactly
/// one `write_response`.
pub trait ValueSink: Send {
    fn update(&mut self, group: &str, tag: &str, value: PointValue);

    fn write_response(&mut self, result: Result<(), ErrorKind>);
}

/// Sink that keeps everything in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub updates: Vec<(String, String, PointValue)>,
    pub writes: Vec<Result<(), ErrorKind>>,
}

impl CollectingSink {
    /// Latest value delivered for `tag`.
    pub fn last(&self, tag: &str) -> Option<&PointValue> {
        self.updates
            .iter()
            .rev()
            .find(|(_, t, _)| t == tag)
            .map(|(_, _, v)| v)
    }

    pub fn clear(&mut self) {
        self.updates.clear();
        self.writes.clear();
    }
}

impl ValueSink for CollectingSink {
    fn update(&mut self, group: &str, tag: &str, value: PointValue) {
        self.updates.push((group.to_string(), tag.to_string(), value));
    }

    fn write_response(&mut self, result: Result<(), ErrorKind>) {
        self.writes.push(result);
    }
}
