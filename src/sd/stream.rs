//! The `CMD25` multi-block write state machine: once started,
//! the transfer stays non-preemptible until a sector boundary, where the
//! caller's `StreamResponse` decides whether to continue, pause (`Skip`),
//! or finish (`Stop`).

use crate::error::FsError;
use crate::storage::StreamResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    /// Waiting on the caller to `feed_stream` the first (or next) sector.
    AwaitingData,
    /// Clocking the sector's bytes out to the card.
    Transferring { bytes_sent: u16 },
    /// Waiting for the data-response token and the busy-release byte.
    WaitAccepted,
    /// Busy-polling while the card programs the sector.
    Programming,
    Done,
}

/// Tracks one in-flight multi-block write independent of the SPI bus itself
/// (`SdCard` owns the bus and drives this machine from `poll_write_stream`).
pub struct Stream {
    pub state: StreamState,
    pub address: u32,
    pub high_capacity: bool,
    /// Sectors left until the allocation unit boundary the driver must not
    /// hold the bus across.
    pub blocks_remaining_in_ru: u32,
    pub queue_nonempty: bool,
    pub buf: [u8; 512],
    pub error: Option<FsError>,
}

impl Stream {
    pub fn new(address: u32, high_capacity: bool, ru_size_blocks: u32) -> Self {
        Self {
            state: StreamState::AwaitingData,
            address,
            high_capacity,
            blocks_remaining_in_ru: ru_size_blocks.max(1),
            queue_nonempty: false,
            buf: [0; 512],
            error: None,
        }
    }

    /// Called once a sector has been accepted and programmed. Stops early
    /// at a recording-unit boundary if other work is waiting, otherwise
    /// lets the caller's `Skip`/`Stop` decide.
    pub fn on_block_programmed(&mut self, response: Option<StreamResponse>) {
        self.blocks_remaining_in_ru = self.blocks_remaining_in_ru.saturating_sub(1);

        if self.blocks_remaining_in_ru == 0 && self.queue_nonempty {
            self.state = StreamState::Done;
            return;
        }

        match response {
            Some(StreamResponse::Ready) => {
                self.address += if self.high_capacity { 1 } else { 512 };
                self.state = StreamState::AwaitingData;
            }
            Some(StreamResponse::Skip) | None => {
                self.state = StreamState::Done;
            }
            Some(StreamResponse::Stop) => {
                self.state = StreamState::Done;
            }
        }
    }

    pub fn feed(&mut self, response: StreamResponse, buf: Option<&[u8; 512]>) {
        if let (StreamResponse::Ready, Some(b)) = (response, buf) {
            self.buf = *b;
            self.state = StreamState::Transferring { bytes_sent: 0 };
        } else {
            self.state = StreamState::Done;
            if response == StreamResponse::Skip {
                self.queue_nonempty = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_response_advances_address_and_loops() {
        let mut s = Stream::new(100, true, 4);
        s.on_block_programmed(Some(StreamResponse::Ready));
        assert_eq!(s.address, 101);
        assert_eq!(s.state, StreamState::AwaitingData);
    }

    #[test]
    fn byte_addressed_cards_advance_by_block_length() {
        let mut s = Stream::new(1024, false, 4);
        s.on_block_programmed(Some(StreamResponse::Ready));
        assert_eq!(s.address, 1536);
    }

    #[test]
    fn ru_boundary_with_pending_work_forces_stop() {
        let mut s = Stream::new(0, true, 1);
        s.queue_nonempty = true;
        s.on_block_programmed(Some(StreamResponse::Ready));
        assert_eq!(s.state, StreamState::Done);
    }

    #[test]
    fn stop_response_ends_the_stream() {
        let mut s = Stream::new(0, true, 4);
        s.on_block_programmed(Some(StreamResponse::Stop));
        assert_eq!(s.state, StreamState::Done);
    }
}
