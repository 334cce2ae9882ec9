//! Sends UDP datagrams through the transmit path, run as a graph of tasks, and prints the
//! Ethernet frames that come out of it as hex.
//!
//! ```text
//! ethstream --dst-ip 192.168.1.100 -p hello -p world --neighbor-mac 02:00:00:00:00:64
//! ```
//!
//! Every payload gets its own source, and consecutive source ports starting at `--src-port`.
//! With `--neighbor-mac` the ARP request the stack sends for the next hop is answered from
//! that address; without it the request goes unanswered and the datagrams are dropped once the
//! resolver gives up. `--seed` puts the binding straight into the cache instead.

use clap::{value_t, App, Arg, ArgMatches};
use ethstream_packets::{ArpFrame, ArpOp, EthernetFrame, HeaderRecord, MacAddr, ARP_ETHER_TYPE};
use ethstream_runtime::link::composite::TransmitLink;
use ethstream_runtime::link::primitive::{InputChannelLink, OutputChannelLink};
use ethstream_runtime::link::LinkBuilder;
use ethstream_runtime::utils::runner::build_and_run;
use ethstream_runtime::{depacketize, Datagram, Result, StackConfig, StreamWord};
use std::convert::TryFrom;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::thread;
use tracing::{debug, error, info, warn};

fn validate<T: FromStr>(value: String) -> std::result::Result<(), String>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map(|_| ())
        .map_err(|e| format!("{}: {}", value, e))
}

fn args<'a>() -> ArgMatches<'a> {
    App::new("ethstream")
        .version("0.1.0")
        .about("Runs UDP datagrams through the streaming transmit path")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG_FILE")
                .help("JSON stack configuration, defaults apply to missing fields")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("dst-ip")
                .long("dst-ip")
                .value_name("ADDR")
                .takes_value(true)
                .required(true)
                .validator(validate::<Ipv4Addr>),
        )
        .arg(
            Arg::with_name("dst-port")
                .long("dst-port")
                .value_name("PORT")
                .takes_value(true)
                .default_value("5678")
                .validator(validate::<u16>),
        )
        .arg(
            Arg::with_name("src-port")
                .long("src-port")
                .value_name("PORT")
                .takes_value(true)
                .default_value("1234")
                .validator(validate::<u16>),
        )
        .arg(
            Arg::with_name("payload")
                .short("p")
                .long("payload")
                .value_name("TEXT")
                .help("Datagram payload, sent as its UTF-8 bytes. Repeat for more datagrams")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .default_value("hello")
                .validator(|p| {
                    if p.is_empty() {
                        Err(String::from("payload must not be empty"))
                    } else {
                        Ok(())
                    }
                }),
        )
        .arg(
            Arg::with_name("neighbor-mac")
                .short("n")
                .long("neighbor-mac")
                .value_name("MAC")
                .help("Answer ARP requests from this hardware address")
                .takes_value(true)
                .validator(validate::<MacAddr>),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .requires("neighbor-mac")
                .help("Seed the ARP cache with the neighbor instead of answering requests"),
        )
        .arg(
            Arg::with_name("wire-width")
                .short("w")
                .long("wire-width")
                .value_name("BYTES")
                .help("Word width on the wire, defaults to the stack's output width")
                .takes_value(true)
                .validator(validate::<usize>),
        )
        .get_matches()
}

/// One line of hex per 16 bytes.
fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join("\n")
}

/// An ARP request among the stack's output, if `bytes` is one.
fn arp_request(bytes: &[u8]) -> Option<ArpFrame> {
    let frame = EthernetFrame::from_buffer(bytes.to_vec()).ok()?;
    if frame.ether_type() != ARP_ETHER_TYPE {
        return None;
    }
    ArpFrame::try_from(frame)
        .ok()
        .filter(|arp| arp.op() == Some(ArpOp::Request))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let matches = args();
    let config = match matches.value_of("config") {
        Some(path) => StackConfig::load(path)?,
        None => StackConfig::default(),
    };
    let dst_ip = value_t!(matches, "dst-ip", Ipv4Addr).unwrap_or_else(|e| e.exit());
    let dst_port = value_t!(matches, "dst-port", u16).unwrap_or_else(|e| e.exit());
    let src_port = value_t!(matches, "src-port", u16).unwrap_or_else(|e| e.exit());
    let neighbor = match matches.value_of("neighbor-mac") {
        Some(mac) => Some(mac.parse::<MacAddr>()?),
        None => None,
    };
    let payloads: Vec<&str> = matches.values_of("payload").into_iter().flatten().collect();
    let local = config.arp;

    let mut graph = TransmitLink::new()
        .config(config)
        .queue_capacity(payloads.len().max(1));
    if matches.is_present("wire-width") {
        let wire_width = value_t!(matches, "wire-width", usize).unwrap_or_else(|e| e.exit());
        graph = graph.wire_width(wire_width);
    }
    if let (true, Some(mac)) = (matches.is_present("seed"), neighbor) {
        graph = graph.neighbor(dst_ip, mac);
    }
    let (arp_sender, arp_receiver) = crossbeam::unbounded::<ArpFrame>();
    graph = graph.arp_channel(arp_receiver);

    let mut sources = vec![];
    for (i, payload) in payloads.iter().enumerate() {
        let (sender, receiver) = crossbeam::unbounded::<Datagram>();
        let header = HeaderRecord::udp(
            local.local_mac,
            local.local_ip,
            src_port.wrapping_add(i as u16),
            dst_ip,
            dst_port,
        );
        // Senders are dropped here, so each source ends after its datagram.
        if sender
            .send(Datagram::new(header, payload.as_bytes().to_vec()))
            .is_err()
        {
            unreachable!("receiver is held until the graph runs");
        }
        sources.push(receiver);
    }
    info!(datagrams = sources.len(), %dst_ip, dst_port, "sending");

    let (wire_sender, wire_receiver) = crossbeam::unbounded::<StreamWord>();
    let transmitter = thread::spawn(move || {
        build_and_run::<_, InputChannelLink<Datagram>, _, OutputChannelLink<StreamWord>, _>(
            sources,
            vec![wire_sender],
            graph,
        )
    });

    let mut frame: Vec<StreamWord> = Vec::new();
    let mut sent = 0;
    for word in wire_receiver.iter() {
        let last = word.last;
        frame.push(word);
        if !last {
            continue;
        }
        let bytes = depacketize(&frame);
        let bad = frame.iter().any(|word| word.user);
        frame.clear();
        sent += 1;
        println!(
            "frame {} ({} bytes{})\n{}\n",
            sent,
            bytes.len(),
            if bad { ", flagged bad" } else { "" },
            hex_dump(&bytes)
        );

        if let (Some(request), Some(mac)) = (arp_request(&bytes), neighbor) {
            let target = request.target_protocol_addr();
            debug!(%target, %mac, "answering ARP request");
            let reply = ArpFrame::reply(mac, target, local.local_mac, local.local_ip);
            if arp_sender.send(reply).is_err() {
                warn!(%target, "transmitter gone before the ARP reply");
            }
        }
    }
    if !frame.is_empty() {
        warn!(words = frame.len(), "wire ended inside a frame");
    }

    if transmitter.join().is_err() {
        error!("transmit graph panicked");
        std::process::exit(1);
    }
    info!(frames = sent, "done");
    Ok(())
}
