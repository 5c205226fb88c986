#![allow(dead_code)]

use taskstream::{CancelBehaviour, CancelRequestSet, Keyed, OwnerKey, RecordId, TaskStream};

pub const RECORDS_SMALL: usize = 10_000;
pub const RECORDS_LARGE: usize = 100_000;

#[derive(Clone, Copy, Debug)]
pub struct Payload {
    pub owner: OwnerKey,
    pub channel: u8,
    pub value: u64,
}

impl Keyed for Payload {
    fn record_id(&self) -> RecordId {
        RecordId::new(self.owner, self.channel)
    }
}

pub fn payload(index: usize) -> Payload {
    Payload {
        owner: OwnerKey::new(index as u32, 0),
        channel: 0,
        value: index as u64,
    }
}

/// Seeds a fresh single-lane stream with `count` records.
pub fn seeded_stream(count: usize) -> TaskStream<Payload> {
    let mut stream = TaskStream::new(1, CancelBehaviour::Delete);
    {
        let mut writer = stream.writer(0).expect("lane 0 exists");
        for index in 0..count {
            writer.write(payload(index));
        }
    }
    stream
}

/// An empty, already-consolidated request set.
pub fn empty_requests() -> CancelRequestSet {
    let mut requests = CancelRequestSet::new(1);
    requests.consolidate();
    requests
}

/// A request set cancelling every `stride`-th owner below `count`.
pub fn strided_requests(count: usize, stride: usize) -> CancelRequestSet {
    let mut requests = CancelRequestSet::new(1);
    {
        let mut writer = requests.writer(0).expect("lane 0 exists");
        for index in (0..count).step_by(stride) {
            writer.request_cancel(RecordId::new(OwnerKey::new(index as u32, 0), 0));
        }
    }
    requests.consolidate();
    requests
}
