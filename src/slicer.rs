use std::ops::Range;

use crate::layout::LayoutParameters;

/// Byte region within a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Header,
    Payload,
    Trailer,
}

/// One 30-second record, as byte ranges into the raw stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBlock {
    pub index: usize,
    pub header: Range<usize>,
    pub payload: Range<usize>,
    pub trailer: Range<usize>,
    /// Tail block cut short by the end of the file
    pub partial: bool,
}

impl RecordBlock {
    pub fn start(&self) -> usize {
        self.header.start
    }

    pub fn end(&self) -> usize {
        self.trailer.end
    }

    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    /// Regions in stream order
    pub fn regions(&self) -> [(Region, Range<usize>); 3] {
        [
            (Region::Header, self.header.clone()),
            (Region::Payload, self.payload.clone()),
            (Region::Trailer, self.trailer.clone()),
        ]
    }
}

/// Split `stream_len` bytes into consecutive records
/// Full records first, then one partial tail holding whatever is left
pub fn slice_records(stream_len: usize, params: &LayoutParameters) -> Vec<RecordBlock> {
    let record_size = params.record_size();
    if record_size == 0 || stream_len == 0 {
        return vec![];
    }

    let full = stream_len / record_size;
    let mut blocks = Vec::with_capacity(full + 1);

    for index in 0..full {
        blocks.push(carve(index, index * record_size, stream_len, params));
    }

    if stream_len % record_size != 0 {
        let mut tail = carve(full, full * record_size, stream_len, params);
        tail.partial = true;
        blocks.push(tail);
    }

    blocks
}

/// Lay header, payload and trailer back to back from `start`, clamping each to `limit`
fn carve(index: usize, start: usize, limit: usize, params: &LayoutParameters) -> RecordBlock {
    let header_end = start.saturating_add(params.header_size).min(limit);
    let payload_end = header_end.saturating_add(params.payload_size()).min(limit);
    let trailer_end = payload_end.saturating_add(params.trailer_size).min(limit);

    RecordBlock {
        index,
        header: start..header_end,
        payload: header_end..payload_end,
        trailer: payload_end..trailer_end,
        partial: false,
    }
}
