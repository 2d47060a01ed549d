//! A `PortHandler` that just logs everything it sees, the harness's
//! stand-in for whatever real application protocol would sit behind a
//! port (`SPEC_FULL.md` §4.4's note that a concrete handler is free to
//! interpret `Seq`/`PortData` however it likes).

use fitterbap_datalink::UpperEvent;
use fitterbap_transport::{PortData, PortHandler, Seq};

#[derive(Clone, Default)]
pub struct LoggingPort {
    pub label: &'static str,
    pub received: usize,
}

impl LoggingPort {
    pub fn new(label: &'static str) -> Self {
        LoggingPort { label, received: 0 }
    }
}

impl PortHandler for LoggingPort {
    fn event_fn(&mut self, event: UpperEvent) {
        log::info!("[{}] connection event: {:?}", self.label, event);
    }

    fn recv_fn(&mut self, seq: Seq, port_data: PortData, msg: &[u8]) {
        self.received += 1;
        log::info!(
            "[{}] recv #{} seq={:?} port_data={} len={}",
            self.label,
            self.received,
            seq,
            port_data.0,
            msg.len()
        );
    }
}
