use crate::arp::{ArpResolver, Resolution};
use crate::channel::{Consumer, Producer, Stage};
use crate::config::ArpConfig;
use crate::error::ConfigError;
use crate::word::StreamWord;
use ethstream_packets::{HeaderRecord, MacAddr, UDP_FRAME_HEADER_LEN};
use std::collections::VecDeque;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    /// Emitting header byte `index`.
    Header {
        bytes: [u8; UDP_FRAME_HEADER_LEN],
        index: usize,
    },
    Payload,
    /// Resolution failed; the payload frame is swallowed.
    Drop,
}

/// Puts finished datagrams on the wire: resolves each header's next-hop MAC, then emits the
/// Ethernet, IPv4 and UDP headers followed by the payload as one byte-wide frame.
///
/// Headers and payload frames pair up strictly in arrival order. A frame whose resolution
/// fails is read and thrown away so the next header meets its own payload.
pub struct FrameAssembler {
    local_mac: MacAddr,
    resolver: ArpResolver<HeaderRecord>,
    state: AssemblerState,
    /// Bytes of the current payload word not yet emitted.
    bytes: VecDeque<u8>,
    word_last: bool,
    word_user: bool,
    output: Option<StreamWord>,
    frames_sent: u64,
    frames_dropped: u64,
}

impl FrameAssembler {
    pub fn new(config: &ArpConfig) -> Result<Self, ConfigError> {
        Ok(FrameAssembler {
            local_mac: config.local_mac,
            resolver: ArpResolver::new(config)?,
            state: AssemblerState::Idle,
            bytes: VecDeque::new(),
            word_last: false,
            word_user: false,
            output: None,
            frames_sent: 0,
            frames_dropped: 0,
        })
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn resolver(&mut self) -> &mut ArpResolver<HeaderRecord> {
        &mut self.resolver
    }

    pub fn header_ready(&self) -> bool {
        self.resolver.can_resolve()
    }

    pub fn payload_ready(&self) -> bool {
        match self.state {
            AssemblerState::Payload => self.bytes.is_empty() && !self.word_last,
            AssemblerState::Drop => true,
            AssemblerState::Idle | AssemblerState::Header { .. } => false,
        }
    }

    fn start_next(&mut self) {
        if self.state != AssemblerState::Idle {
            return;
        }
        match self.resolver.results().pop() {
            Some(Resolution::Resolved { mut frame, mac, .. }) => {
                frame.eth_dest_mac = mac;
                frame.eth_src_mac = self.local_mac;
                self.word_last = false;
                self.word_user = false;
                self.state = AssemblerState::Header {
                    bytes: frame.to_bytes(),
                    index: 0,
                };
            }
            Some(Resolution::Failed { ip, .. }) => {
                debug!(%ip, "dropping datagram with unresolved destination");
                self.state = AssemblerState::Drop;
            }
            None => {}
        }
    }

    fn refill(&mut self) {
        if self.output.is_some() {
            return;
        }
        match self.state {
            AssemblerState::Header { bytes, index } => {
                self.output = Some(StreamWord::full(vec![bytes[index]], false));
                self.state = if index + 1 == UDP_FRAME_HEADER_LEN {
                    AssemblerState::Payload
                } else {
                    AssemblerState::Header {
                        bytes,
                        index: index + 1,
                    }
                };
            }
            AssemblerState::Payload => {
                if let Some(byte) = self.bytes.pop_front() {
                    let last = self.word_last && self.bytes.is_empty();
                    let word = StreamWord::full(vec![byte], last).with_user(last && self.word_user);
                    self.output = Some(word);
                    if last {
                        trace!("frame assembled");
                        self.frames_sent += 1;
                        self.state = AssemblerState::Idle;
                    }
                }
            }
            AssemblerState::Idle | AssemblerState::Drop => {}
        }
    }
}

impl Consumer<HeaderRecord> for FrameAssembler {
    fn ready(&self) -> bool {
        self.header_ready()
    }

    fn push(&mut self, header: HeaderRecord) -> Result<(), HeaderRecord> {
        let ip = header.ip_dest_ip;
        self.resolver.resolve(header, ip)
    }
}

impl Consumer<StreamWord> for FrameAssembler {
    fn ready(&self) -> bool {
        self.payload_ready()
    }

    fn push(&mut self, word: StreamWord) -> Result<(), StreamWord> {
        if !self.payload_ready() {
            return Err(word);
        }
        if self.state == AssemblerState::Drop {
            if word.last {
                self.frames_dropped += 1;
                self.state = AssemblerState::Idle;
            }
            return Ok(());
        }

        self.word_user = self.word_user || word.user;
        self.word_last = word.last;
        self.bytes.extend(word.bytes());
        if self.bytes.is_empty() && word.last {
            // A last word with no valid bytes still has to end the frame.
            self.bytes.push_back(0);
            self.word_user = true;
        }
        self.refill();
        Ok(())
    }
}

impl Producer<StreamWord> for FrameAssembler {
    fn peek(&self) -> Option<&StreamWord> {
        self.output.as_ref()
    }

    fn pop(&mut self) -> Option<StreamWord> {
        let word = self.output.take();
        self.refill();
        word
    }
}

impl Stage for FrameAssembler {
    fn tick(&mut self) {
        self.resolver.tick();
        self.start_next();
        self.refill();
    }

    fn busy(&self) -> bool {
        self.state != AssemblerState::Idle || self.output.is_some() || self.resolver.busy()
    }
}
