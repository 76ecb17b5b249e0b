use super::{
    codec::{S7Codec, S7Value},
    protocol::{
        frame::{
            build_read_var, build_write_var, parse_address, parse_ack_param, PointAddress,
            S7Function, S7Pdu, VarPayloadDataItemIter, VarPayloadStatusItemIter, WireEncode,
        },
        planner::{PlannerConfig, ReadCommand, ReadItem, ReadPlan, S7Planner, WriteCommand},
        session::Session,
        transport::Transport,
        Error, ErrorKind, Result,
    },
    sink::{PointValue, ValueSink},
    supervisor,
    types::{RetryPolicy, TagDescriptor},
};
use bytes::Bytes;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

/// Timing and retry rules of acquisition and write cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePolicy {
    /// Pause between successive commands
    pub interval: Duration,
    /// Pause before re-sending a read that got no response
    pub retry_interval: Duration,
    pub max_retries: u32,
    /// Wait for the WriteVar acknowledgement
    pub await_write_ack: bool,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            retry_interval: Duration::from_millis(500),
            max_retries: 2,
            await_write_ack: true,
        }
    }
}

/// Summary of one acquisition cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// ReadVar requests sent, retries included
    pub requests: usize,
    pub good: usize,
    pub bad: usize,
    pub last_rtt: Option<Duration>,
    /// Cycle stopped early on a transport failure
    pub aborted: bool,
}

/// A named set of tags polled together.
///
/// Tags are parsed once; the read plan is cached per negotiated PDU size.
#[derive(Debug, Clone)]
pub struct PollGroup {
    name: String,
    names: Vec<String>,
    points: Vec<PointAddress>,
    rejected: Vec<(String, ErrorKind)>,
    plan: Option<(u16, ReadPlan)>,
}

impl PollGroup {
    pub fn new(name: impl Into<String>, tags: &[TagDescriptor]) -> Self {
        let mut group = Self {
            name: name.into(),
            names: Vec::new(),
            points: Vec::new(),
            rejected: Vec::new(),
            plan: None,
        };
        group.set_tags(tags);
        group
    }

    /// Replace the tag set. Invalid tags are kept aside and reported on every
    /// cycle without blocking the others.
    pub fn set_tags(&mut self, tags: &[TagDescriptor]) {
        self.names.clear();
        self.points.clear();
        self.rejected.clear();
        self.plan = None;
        for tag in tags {
            match parse_address(&tag.address, tag.kind, &tag.options) {
                Ok(point) => {
                    self.names.push(tag.name.clone());
                    self.points.push(point);
                }
                Err(e) => {
                    warn!(group = %self.name, tag = %tag.name, error = %e, "S7 tag rejected");
                    self.rejected.push((tag.name.clone(), e.kind()));
                }
            }
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn points(&self) -> &[PointAddress] {
        &self.points
    }

    #[inline]
    pub fn rejected(&self) -> &[(String, ErrorKind)] {
        &self.rejected
    }

    /// Plan for `pdu_size`, rebuilt only when the size changed.
    pub fn plan(&mut self, pdu_size: u16) -> &ReadPlan {
        if !matches!(&self.plan, Some((size, _)) if *size == pdu_size) {
            self.plan = None;
        }
        let (_, plan) = self.plan.get_or_insert_with(|| {
            let plan = S7Planner::plan_read(&PlannerConfig::for_pdu(pdu_size), &self.points);
            debug!(
                group = %self.name,
                pdu_size,
                commands = plan.commands.len(),
                items = plan.item_count(),
                "S7 read plan built"
            );
            (pdu_size, plan)
        });
        plan
    }
}

/// Acquisition and write cycles over one session.
#[derive(Debug)]
pub struct S7Driver<T: Transport> {
    session: Session<T>,
    policy: CyclePolicy,
}

impl<T: Transport> S7Driver<T> {
    pub fn new(session: Session<T>, policy: CyclePolicy) -> Self {
        Self { session, policy }
    }

    #[inline]
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    #[inline]
    pub fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    #[inline]
    pub fn policy(&self) -> &CyclePolicy {
        &self.policy
    }

    /// Connect with reconnect backoff; see [`supervisor::establish`].
    pub async fn connect(&mut self, retry: &RetryPolicy, cancel: &CancellationToken) -> Result<u16> {
        supervisor::establish(&mut self.session, retry, cancel).await
    }

    async fn ensure_connected(&mut self) -> Result<u16> {
        match self.session.negotiated_pdu_size() {
            Some(pdu_size) => Ok(pdu_size),
            None => self.session.handshake().await,
        }
    }

    /// Run one acquisition cycle and deliver one value or error per tag.
    #[instrument(level = "debug", skip_all, fields(group = %group.name))]
    pub async fn collect(&mut self, group: &mut PollGroup, sink: &mut dyn ValueSink) -> CycleStats {
        let mut stats = CycleStats::default();
        for (tag, kind) in &group.rejected {
            sink.update(&group.name, tag, Err(*kind));
            stats.bad += 1;
        }
        if group.points.is_empty() {
            return stats;
        }

        let pdu_size = match self.ensure_connected().await {
            Ok(pdu_size) => pdu_size,
            Err(e) => {
                warn!(error = %e, points = group.points.len(), "S7 cycle skipped, not connected");
                let kind = e.kind();
                for name in &group.names {
                    sink.update(&group.name, name, Err(kind));
                }
                stats.bad += group.names.len();
                stats.aborted = true;
                return stats;
            }
        };

        group.plan(pdu_size);
        let PollGroup {
            name: group_name,
            names,
            points,
            plan: Some((_, plan)),
            ..
        } = &*group
        else {
            return stats;
        };
        let mut report = |stats: &mut CycleStats, idx: usize, value: PointValue| {
            if value.is_ok() {
                stats.good += 1;
            } else {
                stats.bad += 1;
            }
            sink.update(group_name, &names[idx], value);
        };

        for (command_idx, command) in plan.commands.iter().enumerate() {
            if stats.aborted {
                for idx in command.points() {
                    report(&mut stats, idx, Err(ErrorKind::Disconnected));
                }
                continue;
            }
            if command_idx > 0 && !self.policy.interval.is_zero() {
                sleep(self.policy.interval).await;
            }

            let outcome = self.read_command(command_idx, command, &mut stats).await;
            match outcome.and_then(|reply| demux_read(command, &reply)) {
                Ok(items) => {
                    for (item, result) in command.items.iter().zip(items) {
                        match result {
                            Ok(data) => {
                                for &idx in &item.points {
                                    report(&mut stats, idx, decode_point(item, &points[idx], &data));
                                }
                            }
                            Err(e) => {
                                log_item_error(command_idx, item, &e);
                                for &idx in &item.points {
                                    report(&mut stats, idx, Err(e.kind()));
                                }
                            }
                        }
                    }
                }
                Err(e) if e.is_transport() => {
                    error!(command = command_idx, error = %e, "S7 cycle aborted");
                    stats.aborted = true;
                    for idx in command.points() {
                        report(&mut stats, idx, Err(ErrorKind::Disconnected));
                    }
                }
                Err(e) => {
                    match &e {
                        Error::NoResponse | Error::DeviceError(_) => {
                            warn!(command = command_idx, error = %e, "S7 read command failed")
                        }
                        _ => error!(command = command_idx, error = %e, "S7 read command failed"),
                    }
                    for idx in command.points() {
                        report(&mut stats, idx, Err(e.kind()));
                    }
                }
            }
        }
        stats.last_rtt = self.session.stats().last_rtt;
        stats
    }

    /// Send one ReadVar, re-sending on no response up to `max_retries` times.
    async fn read_command(
        &mut self,
        command_idx: usize,
        command: &ReadCommand,
        stats: &mut CycleStats,
    ) -> Result<S7Pdu> {
        let specs = command.var_specs();
        let mut attempt = 0u32;
        loop {
            stats.requests += 1;
            debug!(
                command = command_idx,
                items = specs.len(),
                bytes = command.span_total(),
                attempt,
                "S7 read"
            );
            match self.session.round_trip(build_read_var(0, &specs)).await? {
                Some(reply) => return Ok(reply),
                None if attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(
                        command = command_idx,
                        attempt,
                        delay_ms = self.policy.retry_interval.as_millis() as u64,
                        "S7 read timed out, retrying"
                    );
                    sleep(self.policy.retry_interval).await;
                }
                None => return Err(Error::NoResponse),
            }
        }
    }

    /// Write a single tag.
    #[instrument(level = "debug", skip_all, fields(tag = %tag.name))]
    pub async fn write_tag(
        &mut self,
        tag: &TagDescriptor,
        value: &S7Value,
        sink: &mut dyn ValueSink,
    ) -> std::result::Result<(), ErrorKind> {
        self.write_batch(std::slice::from_ref(tag), std::slice::from_ref(value), sink)
            .await
    }

    /// Write several tags. Every command is attempted; the result is the
    /// first failure, if any.
    #[instrument(level = "debug", skip_all, fields(tags = writes.len()))]
    pub async fn write_tags(
        &mut self,
        writes: &[(TagDescriptor, S7Value)],
        sink: &mut dyn ValueSink,
    ) -> std::result::Result<(), ErrorKind> {
        let (tags, values): (Vec<_>, Vec<_>) = writes.iter().cloned().unzip();
        self.write_batch(&tags, &values, sink).await
    }

    async fn write_batch(
        &mut self,
        tags: &[TagDescriptor],
        values: &[S7Value],
        sink: &mut dyn ValueSink,
    ) -> std::result::Result<(), ErrorKind> {
        let mut first_err: Option<ErrorKind> = None;
        let mut points = Vec::with_capacity(tags.len());
        let mut encoded: Vec<Bytes> = Vec::with_capacity(tags.len());
        for (tag, value) in tags.iter().zip(values) {
            let prepared = parse_address(&tag.address, tag.kind, &tag.options)
                .and_then(|point| S7Codec::encode(&point, value).map(|bytes| (point, bytes)));
            match prepared {
                Ok((point, bytes)) => {
                    points.push(point);
                    encoded.push(bytes);
                }
                Err(e) => {
                    warn!(tag = %tag.name, error = %e, "S7 write rejected");
                    first_err.get_or_insert(e.kind());
                }
            }
        }

        if !points.is_empty() {
            match self.ensure_connected().await {
                Ok(pdu_size) => {
                    let commands = S7Planner::plan_write(&points, &encoded);
                    for (command_idx, command) in commands.iter().enumerate() {
                        if command_idx > 0 && !self.policy.interval.is_zero() {
                            sleep(self.policy.interval).await;
                        }
                        if let Err(e) = self.write_command(command, pdu_size).await {
                            warn!(
                                command = command_idx,
                                start = command.start_byte,
                                len = command.data.len(),
                                error = %e,
                                "S7 write command failed"
                            );
                            first_err.get_or_insert(e.kind());
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "S7 write skipped, not connected");
                    first_err.get_or_insert(e.kind());
                }
            }
        }

        let result = first_err.map_or(Ok(()), Err);
        sink.write_response(result);
        result
    }

    async fn write_command(&mut self, command: &WriteCommand, pdu_size: u16) -> Result<()> {
        let pdu = build_write_var(0, &[(command.var_spec(), &command.data[..])]);
        let len = pdu.encoded_len(&());
        if len > pdu_size as usize {
            return Err(Error::RequestTooLarge { len, pdu_size });
        }
        if !self.policy.await_write_ack {
            self.session.send_job(pdu).await?;
            return Ok(());
        }
        let started = Instant::now();
        let reply = self.session.round_trip(pdu).await?.ok_or(Error::NoResponse)?;
        let (function, count) = parse_ack_param(&reply.param)?;
        if function != S7Function::WriteVar || count != 1 {
            return Err(Error::decode("write reply does not match request"));
        }
        let mut status = VarPayloadStatusItemIter::new(count, &reply.payload);
        status
            .next()
            .unwrap_or_else(|| Err(Error::decode("write status missing")))?;
        debug!(
            area = command.area.as_str(),
            block = command.block_number,
            start = command.start_byte,
            elapsed_us = started.elapsed().as_micros() as u64,
            "S7 write acknowledged"
        );
        Ok(())
    }
}

/// Split a ReadVar reply into one result per item of `command`.
fn demux_read(command: &ReadCommand, reply: &S7Pdu) -> Result<Vec<Result<Bytes>>> {
    let (function, count) = parse_ack_param(&reply.param)?;
    if function != S7Function::ReadVar {
        return Err(Error::decode("reply function is not ReadVar"));
    }
    if count as usize != command.items.len() {
        return Err(Error::decode("reply item count mismatch"));
    }
    Ok(VarPayloadDataItemIter::new(count, &reply.payload)
        .map(|item| item.map(|data| reply.payload.slice_ref(data)))
        .collect())
}

fn decode_point(item: &ReadItem, point: &PointAddress, data: &[u8]) -> PointValue {
    let range = item.relative(point);
    let Some(raw) = data.get(range) else {
        return Err(ErrorKind::ProtocolDecodeFailure);
    };
    S7Codec::decode(point, raw).map_err(|e| e.kind())
}

fn log_item_error(command_idx: usize, item: &ReadItem, e: &Error) {
    match e {
        Error::DeviceError(fault) => warn!(
            command = command_idx,
            area = item.area.as_str(),
            block = item.block_number,
            start = item.start_byte,
            fault = %fault,
            "S7 read item rejected by device"
        ),
        other => error!(
            command = command_idx,
            start = item.start_byte,
            error = %other,
            "S7 read item decode failed"
        ),
    }
}
