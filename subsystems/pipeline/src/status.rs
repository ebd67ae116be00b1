//! # Status Report
//!
//! Asynchronous completion tracking. Every submitted frame gets a tag; the
//! frame's last commands store a status payload into the tag's slot and then
//! write the tag into the completion word once all prior work has retired.
//!
//! ## Status Buffer Layout
//!
//! ```text
//! offset 0        8        16       24
//!        ┌────────┬────────┬────────┬─────
//!        │ tag    │ slot 0 │ slot 1 │ ...   slot = tag % depth
//!        └────────┴────────┴────────┴─────
//! ```
//!
//! Entries are drained strictly in submission order. A frame occupies its
//! slot from `begin_frame` until it is drained, so at most `depth` frames are
//! outstanding.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use vcp_core::{ByteSize, Error, OsResource, Result, SubmissionId};
use vcp_hal::OsInterface;

/// Offset of the completion word
pub const COMPLETION_OFFSET: u32 = 0;

const SLOT_BASE: u32 = 8;
const SLOT_STRIDE: u32 = 8;

/// Outcome of a retired frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecStatus {
    /// Payload matches the frame
    Complete,
    /// Payload does not match; the frame's status store was lost
    Error,
}

/// Frame being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStatus {
    /// Completion tag
    pub tag: u32,
    /// Byte offset of the frame's slot
    pub slot_offset: u32,
}

/// One drained report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReportEntry {
    /// Completion tag
    pub tag: u32,
    /// Decoded status
    pub status: CodecStatus,
    /// Raw slot payload
    pub payload: u32,
    /// Submission the frame went out in
    pub submission: SubmissionId,
}

#[derive(Debug)]
struct Pending {
    tag: u32,
    submission: SubmissionId,
}

/// Completion tracker shared by the pipeline and its status packet
#[derive(Debug)]
pub struct StatusReport {
    buffer: OsResource,
    depth: u32,
    /// Frames recorded as submitted
    submitted: AtomicU32,
    /// Frames drained
    reported: AtomicU32,
    /// Highest tag observed in the completion word
    completed: AtomicU32,
    pending: Mutex<VecDeque<Pending>>,
    current: Mutex<Option<FrameStatus>>,
}

impl StatusReport {
    /// Allocate a status buffer for up to `depth` outstanding frames
    pub fn new(os: &OsInterface, depth: u32) -> Result<Self> {
        if depth == 0 {
            return Err(Error::InvalidParameter);
        }
        let bytes = SLOT_BASE as u64 + depth as u64 * SLOT_STRIDE as u64;
        let buffer = os.allocate_resource("status-report", ByteSize::from_bytes(bytes))?;

        Ok(Self {
            buffer,
            depth,
            submitted: AtomicU32::new(0),
            reported: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            pending: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
        })
    }

    /// Status buffer
    pub fn buffer(&self) -> &OsResource {
        &self.buffer
    }

    /// Maximum outstanding frames
    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn slot_offset(&self, tag: u32) -> u32 {
        SLOT_BASE + (tag % self.depth) * SLOT_STRIDE
    }

    // -------------------------------------------------------------------------
    // Frame lifecycle
    // -------------------------------------------------------------------------

    /// Reserve a tag for the next frame
    pub fn begin_frame(&self) -> Result<FrameStatus> {
        let mut current = self.current.lock();
        if current.is_some() {
            return Err(Error::InvalidState);
        }

        let submitted = self.submitted.load(Ordering::Acquire);
        if submitted - self.reported.load(Ordering::Acquire) >= self.depth {
            log::warn!("status: {} frames outstanding", self.depth);
            return Err(Error::Busy);
        }

        let tag = submitted.wrapping_add(1);
        let frame = FrameStatus {
            tag,
            slot_offset: self.slot_offset(tag),
        };
        *current = Some(frame);
        Ok(frame)
    }

    /// Frame being recorded
    pub fn current_frame(&self) -> Option<FrameStatus> {
        *self.current.lock()
    }

    /// Record that the current frame went out as `submission`
    pub fn record_submission(&self, submission: SubmissionId) -> Result<()> {
        let frame = self.current.lock().take().ok_or(Error::InvalidState)?;
        self.pending.lock().push_back(Pending {
            tag: frame.tag,
            submission,
        });
        self.submitted.fetch_add(1, Ordering::AcqRel);
        log::trace!("status: tag {} -> {:?}", frame.tag, submission);
        Ok(())
    }

    /// Drop the current frame; its tag is reused
    pub fn abort_frame(&self) {
        if let Some(frame) = self.current.lock().take() {
            log::debug!("status: aborted tag {}", frame.tag);
        }
    }

    // -------------------------------------------------------------------------
    // Completion
    // -------------------------------------------------------------------------

    /// Read the completion word and return the highest completed tag
    fn poll(&self) -> u32 {
        let device = match self.buffer.read_u32(COMPLETION_OFFSET) {
            Ok(tag) => tag,
            Err(e) => {
                log::warn!("status: completion word unreadable: {}", e);
                0
            },
        };
        let device = device.min(self.submitted.load(Ordering::Acquire));
        self.completed.fetch_max(device, Ordering::AcqRel).max(device)
    }

    /// Frames completed and not yet drained
    pub fn get_completed_report(&self) -> u32 {
        self.poll()
            .saturating_sub(self.reported.load(Ordering::Acquire))
    }

    /// Drain up to `max` of the oldest completed reports into `out`
    ///
    /// Returns how many entries were appended.
    pub fn get_status_report(&self, out: &mut Vec<StatusReportEntry>, max: usize) -> usize {
        let completed = self.poll();
        let mut pending = self.pending.lock();
        let mut drained = 0;

        while drained < max {
            match pending.front() {
                Some(front) if front.tag <= completed => {},
                _ => break,
            }
            let Some(entry) = pending.pop_front() else {
                break;
            };

            let payload = self
                .buffer
                .read_u32(self.slot_offset(entry.tag))
                .unwrap_or_default();
            let status = if payload == entry.tag {
                CodecStatus::Complete
            } else {
                CodecStatus::Error
            };
            out.push(StatusReportEntry {
                tag: entry.tag,
                status,
                payload,
                submission: entry.submission,
            });
            self.reported.fetch_add(1, Ordering::AcqRel);
            drained += 1;
        }

        if drained > 0 {
            log::debug!("status: drained {} report(s)", drained);
        }
        drained
    }

    /// Frames submitted and not yet drained
    pub fn outstanding(&self) -> u32 {
        self.submitted.load(Ordering::Acquire) - self.reported.load(Ordering::Acquire)
    }
}

static_assertions::assert_impl_all!(StatusReport: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use vcp_hal::OsConfig;

    fn report(depth: u32) -> StatusReport {
        StatusReport::new(&OsInterface::new(OsConfig::default()), depth).unwrap()
    }

    /// Stand-in for the device retiring a frame's status commands
    fn complete(report: &StatusReport, tag: u32) {
        report
            .buffer()
            .write_u32(report.slot_offset(tag), tag)
            .unwrap();
        report.buffer().write_u32(COMPLETION_OFFSET, tag).unwrap();
    }

    fn submit(report: &StatusReport, id: u64) -> u32 {
        let frame = report.begin_frame().unwrap();
        report.record_submission(SubmissionId::new(id)).unwrap();
        frame.tag
    }

    #[test]
    fn test_zero_depth_rejected() {
        let os = OsInterface::new(OsConfig::default());
        assert_eq!(StatusReport::new(&os, 0).unwrap_err(), Error::InvalidParameter);
    }

    #[test]
    fn test_fifo_exactly_once() {
        let report = report(8);
        let tags: Vec<u32> = (1..=3).map(|i| submit(&report, i)).collect();
        assert_eq!(tags, [1, 2, 3]);
        assert_eq!(report.get_completed_report(), 0);

        complete(&report, 1);
        complete(&report, 2);
        assert_eq!(report.get_completed_report(), 2);

        let mut out = Vec::new();
        assert_eq!(report.get_status_report(&mut out, 1), 1);
        assert_eq!(report.get_status_report(&mut out, 8), 1);
        assert_eq!(report.get_status_report(&mut out, 8), 0);

        let drained: Vec<u32> = out.iter().map(|e| e.tag).collect();
        assert_eq!(drained, [1, 2]);
        assert!(out.iter().all(|e| e.status == CodecStatus::Complete));
        assert_eq!(out[1].submission, SubmissionId::new(2));
        assert_eq!(report.get_completed_report(), 0);
        assert_eq!(report.outstanding(), 1);
    }

    #[test]
    fn test_busy_when_full() {
        let report = report(2);
        submit(&report, 1);
        submit(&report, 2);
        assert_eq!(report.begin_frame(), Err(Error::Busy));

        complete(&report, 2);
        let mut out = Vec::new();
        assert_eq!(report.get_status_report(&mut out, 1), 1);
        assert!(report.begin_frame().is_ok());
    }

    #[test]
    fn test_abort_reuses_tag() {
        let report = report(4);
        let first = report.begin_frame().unwrap();
        assert_eq!(report.begin_frame(), Err(Error::InvalidState));
        report.abort_frame();

        let again = report.begin_frame().unwrap();
        assert_eq!(first, again);
        assert!(report.current_frame().is_some());
    }

    #[test]
    fn test_lost_payload_is_error() {
        let report = report(4);
        let tag = submit(&report, 1);
        report.buffer().write_u32(COMPLETION_OFFSET, tag).unwrap();

        let mut out = Vec::new();
        report.get_status_report(&mut out, 4);
        assert_eq!(out[0].status, CodecStatus::Error);
    }
}
