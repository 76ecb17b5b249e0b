use super::frame::{PointAddress, S7Area, S7TransportSize, S7VarSpec, ValueKind};
use bytes::{Bytes, BytesMut};

/// Upper bound on items in one ReadVar request
pub const MAX_ITEMS: usize = 20;
/// Response overhead charged against the PDU: S7 ack header, parameter and one
/// item head (18) plus TPKT and COTP DT (7).
pub const READ_FRAME_OVERHEAD: usize = 25;
/// PDU size assumed before negotiation has completed
pub const DEFAULT_PDU_SIZE: u16 = 240;

// TPKT + COTP DT + S7 job header + function/count
const READ_REQUEST_BASE: usize = 19;
const VAR_SPEC_LEN: usize = 12;

/// Capacity limits for one request, derived from the negotiated PDU size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Byte budget for the spans of one read command
    pub max_span_bytes: usize,
    /// Item limit per read command
    pub max_items: usize,
}

impl PlannerConfig {
    pub fn for_pdu(pdu_size: u16) -> Self {
        let pdu = pdu_size as usize;
        Self {
            max_span_bytes: pdu.saturating_sub(READ_FRAME_OVERHEAD).max(1),
            max_items: (pdu.saturating_sub(READ_REQUEST_BASE) / VAR_SPEC_LEN).clamp(1, MAX_ITEMS),
        }
    }

    #[inline]
    pub fn with_max_span_bytes(mut self, max_span_bytes: usize) -> Self {
        self.max_span_bytes = max_span_bytes.max(1);
        self
    }

    #[inline]
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.clamp(1, MAX_ITEMS);
        self
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::for_pdu(DEFAULT_PDU_SIZE)
    }
}

/// One contiguous span requested as a single read item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadItem {
    pub area: S7Area,
    pub block_number: u16,
    pub start_byte: u32,
    pub span_len: u16,
    /// Indices of the covered points in the planner input
    pub points: Vec<usize>,
}

impl ReadItem {
    /// Byte range of `point` relative to the span start.
    #[inline]
    pub fn relative(&self, point: &PointAddress) -> std::ops::Range<usize> {
        let start = (point.byte_offset - self.start_byte) as usize;
        start..start + point.wire_len_bytes as usize
    }

    pub fn var_spec(&self) -> S7VarSpec {
        S7VarSpec {
            transport_size: S7TransportSize::Byte,
            count: self.span_len,
            db_number: self.block_number,
            area: self.area,
            byte_address: self.start_byte,
            bit_index: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadCommand {
    pub items: Vec<ReadItem>,
}

impl ReadCommand {
    pub fn var_specs(&self) -> Vec<S7VarSpec> {
        self.items.iter().map(ReadItem::var_spec).collect()
    }

    /// Every point index covered by this command, in item order.
    pub fn points(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.iter().flat_map(|item| item.points.iter().copied())
    }

    #[inline]
    pub fn span_total(&self) -> usize {
        self.items.iter().map(|i| i.span_len as usize).sum()
    }
}

/// Ordered read commands for one point set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadPlan {
    pub commands: Vec<ReadCommand>,
}

impl ReadPlan {
    #[inline]
    pub fn item_count(&self) -> usize {
        self.commands.iter().map(|c| c.items.len()).sum()
    }
}

/// A single write item with its serialized data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub area: S7Area,
    pub block_number: u16,
    pub start_byte: u32,
    /// Bit index for bit writes, else 0
    pub bit_index: u8,
    pub transport_size: S7TransportSize,
    pub data: Bytes,
    /// Indices of the covered points in the planner input
    pub points: Vec<usize>,
}

impl WriteCommand {
    pub fn var_spec(&self) -> S7VarSpec {
        let count = match self.transport_size {
            S7TransportSize::Bit => 1,
            _ => self.data.len() as u16,
        };
        S7VarSpec {
            transport_size: self.transport_size,
            count,
            db_number: self.block_number,
            area: self.area,
            byte_address: self.start_byte,
            bit_index: self.bit_index,
        }
    }

    /// Write of one bit-kind point. Only the lowest bit of `value` is sent.
    pub fn bit(index: usize, point: &PointAddress, value: u8) -> Self {
        Self {
            area: point.area,
            block_number: point.block_number,
            start_byte: point.byte_offset,
            bit_index: point.bit_index,
            transport_size: S7TransportSize::Bit,
            data: Bytes::copy_from_slice(&[value & 0x01]),
            points: vec![index],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    area: S7Area,
    block: u16,
    start: u32,
    len: u16,
}

impl From<&PointAddress> for SortKey {
    #[inline]
    fn from(p: &PointAddress) -> Self {
        Self {
            area: p.area,
            block: p.block_number,
            start: p.byte_offset,
            len: p.wire_len_bytes,
        }
    }
}

/// Span being grown while walking sorted points
#[derive(Debug)]
struct OpenSpan {
    area: S7Area,
    block: u16,
    start: u32,
    end: u32,
    points: Vec<usize>,
}

impl OpenSpan {
    fn open(index: usize, p: &PointAddress) -> Self {
        Self {
            area: p.area,
            block: p.block_number,
            start: p.byte_offset,
            end: p.end(),
            points: vec![index],
        }
    }

    /// Span length after absorbing `p`, if `p` touches or overlaps this span.
    #[inline]
    fn merged_len(&self, p: &PointAddress) -> Option<usize> {
        if p.area != self.area || p.block_number != self.block || p.byte_offset > self.end {
            return None;
        }
        Some((self.end.max(p.end()) - self.start) as usize)
    }

    #[inline]
    fn absorb(&mut self, index: usize, p: &PointAddress) {
        self.end = self.end.max(p.end());
        self.points.push(index);
    }

    #[inline]
    fn len(&self) -> usize {
        (self.end - self.start) as usize
    }
}

/// Stateless planning over point addresses.
pub struct S7Planner;

impl S7Planner {
    /// Group points into read commands.
    ///
    /// Points are stable-sorted by `(area, block, offset, len)`. A point joins
    /// the open span when it is in the same block, starts at or before the span
    /// end, and the merged span stays strictly below `max_span_bytes`. Items
    /// then fill commands until their spans would exceed `max_span_bytes` or the
    /// item limit is reached.
    pub fn plan_read(cfg: &PlannerConfig, points: &[PointAddress]) -> ReadPlan {
        let mut plan = ReadPlan::default();
        let mut current = ReadCommand::default();
        let mut running = 0usize;

        for span in Self::read_spans(points, cfg.max_span_bytes) {
            let len = span.len();
            let full = current.items.len() >= cfg.max_items;
            if !current.items.is_empty() && (full || running + len > cfg.max_span_bytes) {
                plan.commands.push(std::mem::take(&mut current));
                running = len;
            } else {
                running += len;
            }
            current.items.push(ReadItem {
                area: span.area,
                block_number: span.block,
                start_byte: span.start,
                span_len: len as u16,
                points: span.points,
            });
        }
        if !current.items.is_empty() {
            plan.commands.push(current);
        }
        plan
    }

    /// Group encoded point values into write commands.
    ///
    /// Bit points become one single-bit write each. The rest merge by
    /// contiguity without a size cap, at most `MAX_ITEMS` points per span, and
    /// each span is one command whose buffer holds every point's bytes at its
    /// relative offset. `values[i]` must be the wire encoding of `points[i]`.
    pub fn plan_write(points: &[PointAddress], values: &[Bytes]) -> Vec<WriteCommand> {
        debug_assert_eq!(points.len(), values.len());
        let mut commands = Vec::new();

        let mut byte_points = Vec::with_capacity(points.len());
        for (idx, p) in points.iter().enumerate() {
            if p.kind == ValueKind::Bit {
                let v = values.get(idx).and_then(|b| b.first()).copied().unwrap_or(0);
                commands.push(WriteCommand::bit(idx, p, v));
            } else {
                byte_points.push(idx);
            }
        }

        let mut order = byte_points;
        order.sort_by_key(|&i| SortKey::from(&points[i]));

        let mut open: Option<OpenSpan> = None;
        for idx in order {
            let p = &points[idx];
            match open.as_mut() {
                Some(span) if span.points.len() < MAX_ITEMS && span.merged_len(p).is_some() => {
                    span.absorb(idx, p);
                }
                _ => {
                    if let Some(done) = open.take() {
                        commands.push(Self::fill_write(done, points, values));
                    }
                    open = Some(OpenSpan::open(idx, p));
                }
            }
        }
        if let Some(done) = open {
            commands.push(Self::fill_write(done, points, values));
        }
        commands
    }

    fn read_spans(points: &[PointAddress], cap: usize) -> Vec<OpenSpan> {
        let mut order: Vec<usize> = (0..points.len()).collect();
        order.sort_by_key(|&i| SortKey::from(&points[i]));

        let mut spans: Vec<OpenSpan> = Vec::new();
        for idx in order {
            let p = &points[idx];
            let joined = match spans.last_mut() {
                Some(span) => match span.merged_len(p) {
                    Some(len) if len < cap => {
                        span.absorb(idx, p);
                        true
                    }
                    _ => false,
                },
                None => false,
            };
            if !joined {
                spans.push(OpenSpan::open(idx, p));
            }
        }
        spans
    }

    fn fill_write(span: OpenSpan, points: &[PointAddress], values: &[Bytes]) -> WriteCommand {
        let mut buf = BytesMut::zeroed(span.len());
        for &idx in &span.points {
            let p = &points[idx];
            let off = (p.byte_offset - span.start) as usize;
            let n = (p.wire_len_bytes as usize).min(values[idx].len());
            buf[off..off + n].copy_from_slice(&values[idx][..n]);
        }
        WriteCommand {
            area: span.area,
            block_number: span.block,
            start_byte: span.start,
            bit_index: 0,
            transport_size: S7TransportSize::Byte,
            data: buf.freeze(),
            points: span.points,
        }
    }
}
