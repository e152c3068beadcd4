//! Test doubles: scripted providers and a tiny loopback HTTP server

use super::{AddressCandidate, FetchFailure, ReverseGeocoder};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

/// Canned answer for one connection to the loopback server
pub(crate) enum Reply {
    Respond { status: u16, body: String },
    /// Accept the request, then hold the connection without answering
    Stall(Duration),
}

impl Reply {
    pub(crate) fn json(status: u16, body: &str) -> Self {
        Reply::Respond {
            status,
            body: body.to_string(),
        }
    }
}

/// Serve `replies` to consecutive connections on an ephemeral port.
/// Returns the base URL and a handle yielding the received request lines.
pub(crate) fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    let handle = std::thread::spawn(move || {
        let mut requests = Vec::new();
        for reply in replies {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let head = String::from_utf8_lossy(&head);
            requests.push(head.lines().next().unwrap_or_default().to_string());

            match reply {
                Reply::Respond { status, body } => {
                    let response = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes());
                }
                Reply::Stall(duration) => std::thread::sleep(duration),
            }
        }
        requests
    });

    (endpoint, handle)
}

pub(crate) fn candidate(provider: &str, locality: &str) -> AddressCandidate {
    AddressCandidate {
        road: Some("Jalan Stub".to_string()),
        locality: Some(locality.to_string()),
        city: Some("Jakarta Pusat".to_string()),
        province: Some("DKI Jakarta".to_string()),
        display_name: Some(format!("Jalan Stub, {}, Jakarta Pusat", locality)),
        ..AddressCandidate::empty(provider)
    }
}

/// Provider that replays a fixed script of outcomes, then repeats a default
pub(crate) struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<AddressCandidate, FetchFailure>>>,
    otherwise: Result<AddressCandidate, FetchFailure>,
    probe: Result<(), FetchFailure>,
    calls: AtomicUsize,
    probes: AtomicUsize,
    zooms: Mutex<Vec<Option<u8>>>,
}

impl ScriptedProvider {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            otherwise: Err(FetchFailure::NoResult),
            probe: Ok(()),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            zooms: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn then(self, outcome: Result<AddressCandidate, FetchFailure>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub(crate) fn otherwise(mut self, outcome: Result<AddressCandidate, FetchFailure>) -> Self {
        self.otherwise = outcome;
        self
    }

    pub(crate) fn unreachable(mut self) -> Self {
        self.probe = Err(FetchFailure::transport("connection refused"));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub(crate) fn zooms(&self) -> Vec<Option<u8>> {
        self.zooms.lock().unwrap().clone()
    }
}

impl ReverseGeocoder for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn reverse(&self, _lat: f64, _lon: f64, zoom: Option<u8>) -> Result<AddressCandidate, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.zooms.lock().unwrap().push(zoom);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.otherwise.clone())
    }

    fn probe(&self) -> Result<(), FetchFailure> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.probe.clone()
    }
}

/// Provider whose answer is derived from the coordinate itself, with a
/// latitude dependent delay so concurrent calls finish out of order.
/// Latitudes that are whole multiples of 3 have no address.
pub(crate) struct EchoProvider {
    name: String,
}

impl EchoProvider {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl ReverseGeocoder for EchoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn reverse(&self, lat: f64, _lon: f64, _zoom: Option<u8>) -> Result<AddressCandidate, FetchFailure> {
        let step = lat.abs() as u64;
        std::thread::sleep(Duration::from_millis((7 - step % 7) * 3));
        if step % 3 == 0 {
            return Err(FetchFailure::NoResult);
        }
        Ok(candidate(&self.name, &format!("Area {}", step)))
    }

    fn probe(&self) -> Result<(), FetchFailure> {
        Ok(())
    }
}
