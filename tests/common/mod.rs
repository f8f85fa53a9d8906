//! Shared helpers for integration tests: a raw wire client and a pump that
//! lets the server process what the client sent.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use wlserver::server::{Client, Display};

pub const DISPLAY_ID: u32 = 1;

// wl_display
pub const SYNC: u16 = 0;
pub const GET_REGISTRY: u16 = 1;
pub const EV_ERROR: u16 = 0;
pub const EV_DELETE_ID: u16 = 1;

// wl_registry
pub const BIND: u16 = 0;
pub const EV_GLOBAL: u16 = 0;
pub const EV_GLOBAL_REMOVE: u16 = 1;

/// A request argument as the client puts it on the wire.
pub enum Arg<'a> {
    Int(i32),
    Uint(u32),
    Fixed(f64),
    Str(&'a str),
    Object(u32),
    NewId(u32),
    Array(&'a [u8]),
}

#[derive(Debug, Clone)]
pub struct Message {
    pub object: u32,
    pub opcode: u16,
    pub body: Vec<u8>,
}

impl Message {
    pub fn reader(&self) -> Reader<'_> {
        Reader { body: &self.body, pos: 0 }
    }
}

pub struct Reader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    pub fn uint(&mut self) -> u32 {
        let word = u32::from_ne_bytes(self.body[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        word
    }

    pub fn int(&mut self) -> i32 {
        self.uint() as i32
    }

    pub fn fixed(&mut self) -> f64 {
        f64::from(self.int()) / 256.0
    }

    pub fn string(&mut self) -> Option<String> {
        let len = self.uint() as usize;
        if len == 0 {
            return None;
        }
        let text = String::from_utf8(self.body[self.pos..self.pos + len - 1].to_vec()).unwrap();
        self.pos += (len + 3) & !3;
        Some(text)
    }

    pub fn array(&mut self) -> Vec<u8> {
        let len = self.uint() as usize;
        let data = self.body[self.pos..self.pos + len].to_vec();
        self.pos += (len + 3) & !3;
        data
    }
}

pub fn encode_request(object: u32, opcode: u16, args: &[Arg<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for arg in args {
        match arg {
            Arg::Int(v) => body.extend_from_slice(&v.to_ne_bytes()),
            Arg::Uint(v) | Arg::Object(v) | Arg::NewId(v) => body.extend_from_slice(&v.to_ne_bytes()),
            Arg::Fixed(v) => body.extend_from_slice(&((v * 256.0) as i32).to_ne_bytes()),
            Arg::Str(s) => {
                body.extend_from_slice(&(s.len() as u32 + 1).to_ne_bytes());
                body.extend_from_slice(s.as_bytes());
                body.push(0);
                pad(&mut body);
            }
            Arg::Array(data) => {
                body.extend_from_slice(&(data.len() as u32).to_ne_bytes());
                body.extend_from_slice(data);
                pad(&mut body);
            }
        }
    }
    let size = (8 + body.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&object.to_ne_bytes());
    out.extend_from_slice(&((size << 16) | u32::from(opcode)).to_ne_bytes());
    out.extend_from_slice(&body);
    out
}

fn pad(body: &mut Vec<u8>) {
    while body.len() % 4 != 0 {
        body.push(0);
    }
}

/// The client end of a connection.
pub struct TestClient {
    pub stream: UnixStream,
    input: Vec<u8>,
    next_id: u32,
}

impl TestClient {
    pub fn new(stream: UnixStream) -> Self {
        stream.set_nonblocking(true).unwrap();
        Self {
            stream,
            input: Vec::new(),
            next_id: 2,
        }
    }

    /// A connected pair: the server side wrapped as a [`Client`] of
    /// `display`, the other end as a test client.
    pub fn connect(display: &Display) -> (Client, TestClient) {
        let (server_end, client_end) = UnixStream::pair().unwrap();
        let client = Client::new(display, server_end).unwrap();
        (client, TestClient::new(client_end))
    }

    pub fn new_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn send(&mut self, object: u32, opcode: u16, args: &[Arg<'_>]) {
        self.stream.write_all(&encode_request(object, opcode, args)).unwrap();
    }

    /// Send a request carrying `fd` as its only descriptor.
    pub fn send_with_fd(&mut self, object: u32, opcode: u16, args: &[Arg<'_>], fd: RawFd) {
        let bytes = encode_request(object, opcode, args);
        unsafe {
            let mut iov = libc::iovec {
                iov_base: bytes.as_ptr() as *mut libc::c_void,
                iov_len: bytes.len(),
            };
            let space = libc::CMSG_SPACE(std::mem::size_of::<RawFd>() as u32) as usize;
            let mut control = vec![0u8; space];
            let mut msg: libc::msghdr = std::mem::zeroed();
            msg.msg_iov = &mut iov;
            msg.msg_iovlen = 1;
            msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
            msg.msg_controllen = space as _;
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(std::mem::size_of::<RawFd>() as u32) as _;
            std::ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut RawFd, fd);
            let sent = libc::sendmsg(self.stream.as_raw_fd(), &msg, 0);
            assert_eq!(sent, bytes.len() as isize);
        }
    }

    pub fn sync(&mut self) -> u32 {
        let id = self.new_id();
        self.send(DISPLAY_ID, SYNC, &[Arg::NewId(id)]);
        id
    }

    pub fn get_registry(&mut self) -> u32 {
        let id = self.new_id();
        self.send(DISPLAY_ID, GET_REGISTRY, &[Arg::NewId(id)]);
        id
    }

    pub fn bind(&mut self, registry: u32, name: u32, interface: &str, version: u32) -> u32 {
        let id = self.new_id();
        self.send(
            registry,
            BIND,
            &[Arg::Uint(name), Arg::Str(interface), Arg::Uint(version), Arg::NewId(id)],
        );
        id
    }

    /// Everything the server has written so far, split into messages.
    pub fn read_messages(&mut self) -> Vec<Message> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.input.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::ConnectionReset => break,
                Err(err) => panic!("read failed: {}", err),
            }
        }
        let mut messages = Vec::new();
        while self.input.len() >= 8 {
            let object = u32::from_ne_bytes(self.input[0..4].try_into().unwrap());
            let word = u32::from_ne_bytes(self.input[4..8].try_into().unwrap());
            let size = (word >> 16) as usize;
            if self.input.len() < size {
                break;
            }
            messages.push(Message {
                object,
                opcode: (word & 0xffff) as u16,
                body: self.input[8..size].to_vec(),
            });
            self.input.drain(..size);
        }
        messages
    }

    /// Whether the server closed the connection.
    pub fn is_hung_up(&mut self) -> bool {
        let mut byte = 0u8;
        let n = unsafe {
            libc::recv(
                self.stream.as_raw_fd(),
                &mut byte as *mut u8 as *mut libc::c_void,
                1,
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };
        n == 0
    }
}

/// Let the server read and answer pending requests, then collect its
/// replies.
pub fn roundtrip(display: &Display, client: &mut TestClient) -> Vec<Message> {
    let event_loop = display.event_loop().unwrap();
    for _ in 0..3 {
        event_loop.dispatch(0).unwrap();
        display.flush_clients().unwrap();
    }
    client.read_messages()
}

/// `(name, interface, version)` of every `wl_registry.global` in `messages`.
pub fn globals(messages: &[Message], registry: u32) -> Vec<(u32, String, u32)> {
    messages
        .iter()
        .filter(|m| m.object == registry && m.opcode == EV_GLOBAL)
        .map(|m| {
            let mut r = m.reader();
            (r.uint(), r.string().unwrap(), r.uint())
        })
        .collect()
}

/// Create a registry and collect the globals it announces.
pub fn discover(display: &Display, client: &mut TestClient) -> (u32, Vec<(u32, String, u32)>) {
    let registry = client.get_registry();
    let messages = roundtrip(display, client);
    let advertised = globals(&messages, registry);
    (registry, advertised)
}

/// Registry name of the first advertised global of `interface`.
pub fn global_name(globals: &[(u32, String, u32)], interface: &str) -> u32 {
    globals
        .iter()
        .find(|(_, name, _)| name == interface)
        .map(|(name, _, _)| *name)
        .unwrap_or_else(|| panic!("{} is not advertised", interface))
}

/// `(object, code, message)` of the first `wl_display.error` in `messages`.
pub fn protocol_error(messages: &[Message]) -> Option<(u32, u32, String)> {
    messages
        .iter()
        .find(|m| m.object == DISPLAY_ID && m.opcode == EV_ERROR)
        .map(|m| {
            let mut r = m.reader();
            (r.uint(), r.uint(), r.string().unwrap_or_default())
        })
}
