//! End-to-end Integration Test Suite
//!
//! Drives messages through a stream the way a worker loop does:
//! - the transport side fills the stream receive buffer
//! - the upper layer pulls it with `rcv_buf` in bounded steps
//! - the upper layer pushes a response with `snd_buf`
//! - the worker clock is refreshed around every step

use std::time::Duration;

use stratus_core::StreamId;
use stratus_htx::Buffer;
use stratus_mux::{handle_standalone_fin, rcv_buf, reset_buf, snd_buf, AppOps, Stream, StreamConfig};
use stratus_time::ThreadClock;
use tracing::debug;

/// Outcome of moving one message across a stream
#[derive(Debug, Default, Clone)]
pub struct FlowReport {
    /// Loop iterations used
    pub steps: u32,
    /// Payload bytes moved
    pub bytes: usize,
    /// End of message seen
    pub fin: bool,
}

/// One stream plus the upper layer buffer it exchanges messages with
pub struct StreamHarness {
    pub stream: Stream,
    pub upper: Buffer,
    step_size: usize,
}

impl StreamHarness {
    /// `step_size` bounds the bytes moved per loop iteration
    pub fn new(id: u64, config: &StreamConfig, step_size: usize) -> Self {
        StreamHarness {
            stream: Stream::new(StreamId::new(id), config),
            upper: Buffer::new(config.rx_buf_size),
            step_size,
        }
    }

    /// Pull the receive buffer into the upper buffer until the message ends
    /// or nothing moves
    pub fn receive_all(&mut self, mut clock: Option<&mut ThreadClock>) -> FlowReport {
        let mut report = FlowReport::default();
        loop {
            if let Some(c) = clock.as_deref_mut() {
                c.update_date(Duration::ZERO, true);
            }
            let (n, fin) = rcv_buf(&mut self.stream, &mut self.upper, self.step_size);
            report.steps += 1;
            report.bytes += n;
            if fin {
                report.fin = true;
                break;
            }
            if n == 0 {
                break;
            }
        }
        debug!(stream = %self.stream.id(), steps = report.steps, bytes = report.bytes, "message received");
        report
    }

    /// Encode the upper buffer onto the stream, draining the send queue to
    /// `wire` between steps
    pub fn send_all(&mut self, app: &dyn AppOps, wire: &mut Vec<u8>) -> FlowReport {
        let mut report = FlowReport::default();
        loop {
            let (n, fin) = snd_buf(&mut self.stream, app, &mut self.upper, self.step_size);
            wire.extend_from_slice(&self.stream.tx.take());
            report.steps += 1;
            report.bytes += n;
            if fin {
                report.fin = true;
                break;
            }
            if n == 0 {
                break;
            }
        }
        report
    }

    /// Abort the outgoing message
    pub fn abort(&mut self) -> usize {
        let pending = self.upper.data();
        reset_buf(&mut self.stream, &mut self.upper, pending)
    }

    /// The transport saw a FIN without payload
    pub fn standalone_fin(&mut self) {
        handle_standalone_fin(&mut self.stream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{block_types, body_of, init_tracing, pattern, MessageSpec};
    use crate::poll_simulator::{ClockFaultModel, PollSimulator};
    use stratus_htx::{BlockType, Htx, PayloadLength};
    use stratus_mux::{HqInterop, StreamFlags};
    use stratus_time::ClockConfig;

    #[test]
    fn test_request_in_small_steps() {
        init_tracing();
        let mut h = StreamHarness::new(0, &StreamConfig::default(), 40);
        let mut msg = MessageSpec::get();
        msg.body = pattern(100);
        msg.deliver(&mut h.stream);

        let report = h.receive_all(None);
        assert!(report.fin);
        assert!(report.steps > 1);
        assert!(h.stream.flags.contains(StreamFlags::EOM_RECV));
        assert_eq!(body_of(&mut h.upper), pattern(100));
        assert_eq!(
            block_types(&mut h.upper),
            vec![BlockType::ReqSl, BlockType::Hdr, BlockType::Eoh, BlockType::Data]
        );
    }

    #[test]
    fn test_request_in_one_swap() {
        let mut h = StreamHarness::new(4, &StreamConfig::default(), 1 << 20);
        MessageSpec::response(pattern(300)).deliver(&mut h.stream);

        let report = h.receive_all(None);
        assert_eq!(report.steps, 1);
        assert!(report.fin);
        assert_eq!(report.bytes, Htx::from_buf(&mut h.upper).data());
    }

    #[test]
    fn test_response_over_hq_interop() {
        let mut h = StreamHarness::new(0, &StreamConfig::small(), 64);
        let body = pattern(700);
        MessageSpec::response(body.clone()).write(&mut h.upper);

        let mut wire = Vec::new();
        let report = h.send_all(&HqInterop, &mut wire);
        assert!(report.fin);
        assert_eq!(wire, body);
        assert!(h.stream.flags.contains(StreamFlags::FIN_SENT));
        assert!(h.upper.is_empty());
    }

    #[test]
    fn test_chunked_response_flags_unknown_length() {
        let mut h = StreamHarness::new(0, &StreamConfig::default(), 1024);
        MessageSpec::chunked(pattern(50)).write(&mut h.upper);

        let mut wire = Vec::new();
        let report = h.send_all(&HqInterop, &mut wire);
        assert!(report.fin);
        assert!(h.stream.flags.contains(StreamFlags::UNKNOWN_PL_LENGTH));
        assert_eq!(wire.len(), 50);
    }

    #[test]
    fn test_abort_pending_response() {
        let mut h = StreamHarness::new(0, &StreamConfig::default(), 1024);
        MessageSpec::response(pattern(20)).write(&mut h.upper);

        let size = h.upper.size();
        assert_eq!(h.abort(), size);
        assert!(h.upper.is_empty());
        assert_eq!(h.abort(), 0);
        assert!(h.stream.flags.contains(StreamFlags::RESET));
    }

    #[test]
    fn test_body_then_standalone_fin() {
        let mut h = StreamHarness::new(0, &StreamConfig::default(), 1024);
        MessageSpec::body_only(30, false).deliver(&mut h.stream);

        let first = h.receive_all(None);
        assert_eq!(first.bytes, 30);
        assert!(!first.fin);

        h.standalone_fin();
        let second = h.receive_all(None);
        assert!(second.fin);
        assert_eq!(second.bytes, 0);
        assert_eq!(body_of(&mut h.upper), pattern(30));
        assert!(Htx::from_buf(&mut h.upper).is_eom());
    }

    #[test]
    fn test_extra_announced_to_upper_layer() {
        let mut h = StreamHarness::new(0, &StreamConfig::default(), 10);
        let mut msg = MessageSpec::body_only(40, false);
        msg.extra = PayloadLength::Known(60);
        msg.deliver(&mut h.stream);

        let (n, fin) = rcv_buf(&mut h.stream, &mut h.upper, 10);
        assert_eq!((n, fin), (10, false));
        assert_eq!(Htx::from_buf(&mut h.upper).extra(), PayloadLength::Known(90));
    }

    #[test]
    fn test_receive_with_clock_refresh() {
        let sim = PollSimulator::new(ClockConfig::default(), ClockFaultModel::none(), 5);
        let mut clock = sim.engine().register_thread();
        let mut h = StreamHarness::new(0, &StreamConfig::default(), 16);
        MessageSpec::body_only(64, true).deliver(&mut h.stream);

        sim.source().advance(Duration::from_millis(3));
        let report = h.receive_all(Some(&mut clock));
        assert!(report.fin);
        assert_eq!(sim.engine().uptime(), Duration::from_millis(3));
    }
}
