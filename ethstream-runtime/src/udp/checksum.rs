use crate::channel::{Consumer, Stage};
use crate::config::UdpChecksumConfig;
use crate::error::ConfigError;
use crate::queue::BoundedQueue;
use crate::word::StreamWord;
use ethstream_packets::{ChecksumAccumulator, HeaderRecord, UDP_HEADER_LEN, UDP_MAX_PAYLOAD_LEN};
use tracing::{debug, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumState {
    Idle,
    SumPseudoHeader,
    SumPayload,
    Finalize,
}

/// Computes the UDP length and checksum of each datagram while its payload streams through.
///
/// A header is accepted only while idle. Its payload is then summed word by word and copied
/// into the payload queue; once the last word is in, the completed header goes into the header
/// queue. Both queues are strictly FIFO, so the n-th header always belongs to the n-th payload
/// frame. A frame that arrives malformed, flagged, or too long for a UDP datagram still gets a
/// header, but its last payload word carries the user bit.
pub struct UdpChecksumPipeline {
    state: ChecksumState,
    header: HeaderRecord,
    acc: ChecksumAccumulator,
    payload_len: usize,
    /// Words of the current frame already in the payload queue.
    frame_words: usize,
    poisoned: bool,
    /// Frame was cut short; swallow input up to its real last word.
    discarding: bool,
    headers: BoundedQueue<HeaderRecord>,
    payload: BoundedQueue<StreamWord>,
    frames: u64,
    poisoned_frames: u64,
}

impl UdpChecksumPipeline {
    pub fn new(config: &UdpChecksumConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(UdpChecksumPipeline {
            state: ChecksumState::Idle,
            header: HeaderRecord::default(),
            acc: ChecksumAccumulator::new(),
            payload_len: 0,
            frame_words: 0,
            poisoned: false,
            discarding: false,
            headers: BoundedQueue::new(config.header_depth),
            payload: BoundedQueue::new(config.payload_depth),
            frames: 0,
            poisoned_frames: 0,
        })
    }

    pub fn state(&self) -> ChecksumState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn poisoned_frames(&self) -> u64 {
        self.poisoned_frames
    }

    pub fn header_ready(&self) -> bool {
        self.state == ChecksumState::Idle
    }

    /// Starts a datagram. Hands the header back unless the pipeline is idle.
    pub fn push_header(&mut self, header: HeaderRecord) -> Result<(), HeaderRecord> {
        if !self.header_ready() {
            return Err(header);
        }
        self.header = header;
        self.acc.reset();
        self.payload_len = 0;
        self.frame_words = 0;
        self.poisoned = false;
        self.discarding = false;
        self.state = ChecksumState::SumPseudoHeader;
        Ok(())
    }

    /// Completed headers, in payload order.
    pub fn headers(&mut self) -> &mut BoundedQueue<HeaderRecord> {
        &mut self.headers
    }

    pub fn payload(&mut self) -> &mut BoundedQueue<StreamWord> {
        &mut self.payload
    }

    fn sum_pseudo_header(&mut self) {
        let header = &self.header;
        self.acc.add_ipv4(header.ip_source_ip);
        self.acc.add_ipv4(header.ip_dest_ip);
        self.acc.add_u16(u16::from(header.ip_protocol));
        self.acc.add_u16(header.udp_source_port);
        self.acc.add_u16(header.udp_dest_port);
        // The UDP length shows up twice, in the pseudo-header and the UDP header. The header
        // part of both is added here and two per payload byte as the payload streams in.
        self.acc.add_u16(2 * UDP_HEADER_LEN as u16);
        self.state = ChecksumState::SumPayload;
    }

    fn sum_payload(&mut self, word: &StreamWord) {
        for byte in word.bytes() {
            if self.payload_len % 2 == 0 {
                self.acc.add_u16(u16::from(byte) << 8);
            } else {
                self.acc.add_u16(u16::from(byte));
            }
            self.acc.add_u16(2);
            self.payload_len += 1;
        }
    }

    fn finalize(&mut self) {
        if !self.headers.ready() {
            return;
        }
        let mut header = self.header;
        header.set_payload_len(self.payload_len.min(UDP_MAX_PAYLOAD_LEN));
        header.udp_checksum = self.acc.finish_udp();
        header.ip_header_checksum = header.compute_ip_header_checksum();
        trace!(
            len = self.payload_len,
            checksum = header.udp_checksum,
            poisoned = self.poisoned,
            "datagram finalized"
        );
        if self.headers.push(header).is_err() {
            unreachable!("header queue was checked for room");
        }
        self.frames += 1;
        if self.poisoned {
            self.poisoned_frames += 1;
        }
        self.state = ChecksumState::Idle;
    }
}

impl Consumer<StreamWord> for UdpChecksumPipeline {
    fn ready(&self) -> bool {
        self.state == ChecksumState::SumPayload
            && self.headers.ready()
            && (self.discarding || self.payload.ready())
    }

    fn push(&mut self, mut word: StreamWord) -> Result<(), StreamWord> {
        if !self.ready() {
            return Err(word);
        }
        if self.discarding {
            if word.last {
                self.discarding = false;
                self.state = ChecksumState::Finalize;
            }
            return Ok(());
        }

        word.poison_if_malformed("udp checksum");
        self.sum_payload(&word);
        if word.user {
            self.poisoned = true;
        }
        if self.payload_len > UDP_MAX_PAYLOAD_LEN && !self.poisoned {
            warn!(len = self.payload_len, "payload too long for a UDP datagram");
            self.poisoned = true;
        }

        // A frame must fit the payload queue whole, or its header could never be released.
        if !word.last && self.frame_words + 1 == self.payload.capacity() {
            debug!(
                words = self.frame_words + 1,
                "payload frame fills the queue, truncating"
            );
            word.last = true;
            self.poisoned = true;
            self.discarding = true;
        }

        let last = word.last;
        if last && self.poisoned {
            word.poison();
        }
        if self.payload.push(word).is_err() {
            unreachable!("payload queue was checked for room");
        }
        self.frame_words += 1;

        if last && !self.discarding {
            self.state = ChecksumState::Finalize;
        }
        Ok(())
    }
}

impl Stage for UdpChecksumPipeline {
    fn tick(&mut self) {
        match self.state {
            ChecksumState::SumPseudoHeader => self.sum_pseudo_header(),
            ChecksumState::Finalize => self.finalize(),
            ChecksumState::Idle | ChecksumState::SumPayload => {}
        }
    }

    fn busy(&self) -> bool {
        self.state != ChecksumState::Idle || !self.headers.is_empty() || !self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{transfer, Producer};
    use crate::utils::test::stages::VecSource;
    use crate::word::{depacketize, frames, packetize};
    use ethstream_packets::{udp_checksum, MacAddr};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::net::Ipv4Addr;

    fn header() -> HeaderRecord {
        HeaderRecord::udp(
            MacAddr::new([2, 0, 0, 0, 0, 1]),
            Ipv4Addr::new(192, 168, 1, 128),
            1234,
            Ipv4Addr::new(192, 168, 1, 100),
            5678,
        )
    }

    /// Feeds one datagram and returns its header and payload words.
    fn checksum(
        pipeline: &mut UdpChecksumPipeline,
        header: HeaderRecord,
        words: Vec<StreamWord>,
        valid: Vec<bool>,
    ) -> (HeaderRecord, Vec<StreamWord>) {
        pipeline.push_header(header).unwrap();
        let mut src = VecSource::with_pattern(words, valid);
        for _ in 0..100_000 {
            transfer(&mut src, &mut *pipeline);
            pipeline.tick();
            src.advance();
            if pipeline.header_ready() {
                break;
            }
        }
        assert!(src.is_empty());
        let header = pipeline.headers().pop().expect("no header emitted");
        let payload = std::iter::from_fn(|| pipeline.payload().pop()).collect();
        (header, payload)
    }

    fn pipeline() -> UdpChecksumPipeline {
        UdpChecksumPipeline::new(&UdpChecksumConfig::default()).unwrap()
    }

    #[test]
    fn worked_example() {
        let mut pipeline = pipeline();
        let (header, payload) =
            checksum(&mut pipeline, header(), packetize(&[1, 2, 3, 4], 1), vec![true]);

        assert_eq!(header.udp_length, 12);
        assert_eq!(header.ip_length, 32);
        assert_eq!(header.udp_checksum, 0x5c9b);
        assert_eq!(header.ip_header_checksum, 0xb698);
        assert_eq!(header.payload_len, 4);
        assert_eq!(depacketize(&payload), vec![1, 2, 3, 4]);
        assert!(payload.iter().all(|w| !w.user));
        assert!(!pipeline.busy());
    }

    #[test]
    fn zero_checksum_sent_as_all_ones() {
        let mut pipeline = pipeline();
        let (header, _) = checksum(
            &mut pipeline,
            header(),
            packetize(&[0x60, 0xa5], 1),
            vec![true],
        );
        assert_eq!(header.udp_checksum, 0xFFFF);
    }

    #[test]
    fn header_refused_until_frame_finalized() {
        let mut pipeline = pipeline();
        pipeline.push_header(header()).unwrap();
        assert!(!pipeline.header_ready());
        assert_eq!(pipeline.push_header(header()), Err(header()));

        // Payload is refused until the pseudo-header has been summed.
        assert!(!pipeline.ready());
        pipeline.tick();
        assert_eq!(pipeline.state(), ChecksumState::SumPayload);
        pipeline.push(StreamWord::full(vec![7], true)).unwrap();
        assert_eq!(pipeline.state(), ChecksumState::Finalize);
        assert!(!pipeline.header_ready());
        pipeline.tick();
        assert!(pipeline.header_ready());
        assert_eq!(pipeline.headers().len(), 1);
    }

    #[test]
    fn matches_reference_checksum() {
        let mut rng = StdRng::seed_from_u64(768);
        let mut pipeline = pipeline();
        for round in 0..50 {
            let len = rng.gen_range(1, 600);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let mut header = header();
            header.udp_source_port = rng.gen();
            header.udp_dest_port = rng.gen();
            header.ip_dest_ip = Ipv4Addr::from(rng.gen::<u32>());
            let width = [1, 2, 4, 8][round % 4];
            let valid = (0..6).map(|_| rng.gen_bool(0.6)).chain(Some(true)).collect();

            let (done, payload) =
                checksum(&mut pipeline, header, packetize(&bytes, width), valid);

            let mut datagram = vec![];
            datagram.extend_from_slice(&header.udp_source_port.to_be_bytes());
            datagram.extend_from_slice(&header.udp_dest_port.to_be_bytes());
            datagram.extend_from_slice(&((len + 8) as u16).to_be_bytes());
            datagram.extend_from_slice(&[0, 0]);
            datagram.extend_from_slice(&bytes);
            assert_eq!(
                done.udp_checksum,
                udp_checksum(header.ip_source_ip, header.ip_dest_ip, &datagram)
            );
            assert_eq!(done.udp_length as usize, len + 8);
            assert_eq!(depacketize(&payload), bytes);
        }
        assert_eq!(pipeline.frames(), 50);
        assert_eq!(pipeline.poisoned_frames(), 0);
    }

    #[test]
    fn flagged_frame_keeps_its_header() {
        let mut pipeline = pipeline();
        let mut words = packetize(&[1, 2, 3, 4, 5], 1);
        words[1].user = true;
        let (header, payload) = checksum(&mut pipeline, header(), words, vec![true]);

        assert_eq!(header.payload_len, 5);
        assert_eq!(payload.len(), 5);
        assert!(payload[4].user && payload[4].last);
        assert_eq!(pipeline.poisoned_frames(), 1);

        // The next frame starts clean.
        let (header, payload) =
            checksum(&mut pipeline, self::header(), packetize(&[1, 2, 3, 4], 1), vec![true]);
        assert_eq!(header.udp_checksum, 0x5c9b);
        assert!(payload.iter().all(|w| !w.user));
    }

    #[test]
    fn malformed_word_poisons_frame() {
        let mut pipeline = pipeline();
        let words = vec![
            StreamWord::new(vec![1, 2, 3, 4], 0b1011, false),
            StreamWord::full(vec![5, 6, 7, 8], true),
        ];
        let (_, payload) = checksum(&mut pipeline, header(), words, vec![true]);
        assert_eq!(payload.len(), 2);
        assert!(payload[1].user);
    }

    #[test]
    fn oversized_frame_is_truncated_and_poisoned() {
        let mut pipeline = UdpChecksumPipeline::new(&UdpChecksumConfig {
            header_depth: 2,
            payload_depth: 4,
        })
        .unwrap();
        let (header, payload) =
            checksum(&mut pipeline, header(), packetize(&[9; 10], 1), vec![true]);

        // Only the bytes that were kept are counted.
        assert_eq!(header.payload_len, 4);
        assert_eq!(payload.len(), 4);
        let frames = frames(payload);
        assert_eq!(frames.len(), 1);
        assert!(frames[0][3].user);
        assert!(!pipeline.busy());
    }

    #[test]
    fn payload_past_ip_length_is_poisoned() {
        let mut pipeline = UdpChecksumPipeline::new(&UdpChecksumConfig {
            header_depth: 2,
            payload_depth: 65520,
        })
        .unwrap();

        // Exactly fills the 16 bit IPv4 total length.
        let (header, payload) = checksum(
            &mut pipeline,
            header(),
            packetize(&vec![3; UDP_MAX_PAYLOAD_LEN], 8),
            vec![true],
        );
        assert_eq!(header.ip_length, 0xFFFF);
        assert_eq!(header.payload_len, UDP_MAX_PAYLOAD_LEN);
        assert!(payload.iter().all(|w| !w.user));
        assert_eq!(pipeline.poisoned_frames(), 0);

        // One byte more fits the UDP length field but not the IPv4 one.
        let (header, payload) = checksum(
            &mut pipeline,
            self::header(),
            packetize(&vec![3; UDP_MAX_PAYLOAD_LEN + 1], 8),
            vec![true],
        );
        assert_eq!(header.ip_length, 0xFFFF);
        assert_eq!(payload.len(), 8189);
        assert_eq!(depacketize(&payload).len(), 65508);
        let last = payload.last().unwrap();
        assert!(last.last && last.user);
        assert_eq!(pipeline.poisoned_frames(), 1);
    }
}
