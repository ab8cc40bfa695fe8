use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use bytes::Bytes;
use tracing::{debug, error, warn};

use amqmux_codec::{Begin, Close, Frame, Open, Performative, ProtocolHeader};
use amqmux_frame::{FrameDecoder, OutputQueue, Segment};

use crate::container::{generate_container_id, next_connection_id, Container};
use crate::endpoint::EndpointState;
use crate::error::{PeerError, Result};
use crate::events::{Dispatcher, EventContext, EventKind};
use crate::session::{Session, SessionEvent};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Options declared in the outbound open performative, plus freeform
/// properties consulted by [`Connection::get_option`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// Container identity. Generated (or inherited from the container)
    /// when absent.
    pub container_id: Option<String>,
    pub hostname: Option<String>,
    pub max_frame_size: Option<u32>,
    pub channel_max: Option<u16>,
    /// Freeform options; fall back to the owning container's options.
    pub properties: HashMap<String, String>,
}

/// One AMQP connection over one byte stream.
///
/// The connection owns the inbound reassembler, the outbound FIFO, the
/// channel-to-session tables, and the lifecycle state machine. All frame
/// output is deferred: state changes mark the connection dirty and a
/// single [`process`](Self::process) pass writes everything the pending
/// transitions require, batched with each session's own output.
pub struct Connection {
    id: u64,
    container: Option<Container>,
    container_id: String,
    options: ConnectionOptions,
    state: EndpointState,
    local_open: Option<Open>,
    remote_open: Option<Open>,
    remote_close: Option<Close>,
    sessions: Vec<Option<Session>>,
    remote_channels: HashMap<u16, u16>,
    decoder: FrameDecoder,
    output: OutputQueue,
    transport: Option<TcpStream>,
    registered: bool,
    dispatcher: Dispatcher,
    events: Vec<EventContext>,
    default_channel: Option<u16>,
}

impl Connection {
    pub fn new(options: ConnectionOptions) -> Self {
        Self::with_container(options, None)
    }

    pub(crate) fn with_container(options: ConnectionOptions, container: Option<Container>) -> Self {
        let container_id = options
            .container_id
            .clone()
            .or_else(|| container.as_ref().map(|c| c.id().to_string()))
            .unwrap_or_else(generate_container_id);

        // The header must precede every frame; queueing it up front keeps
        // that ordering through the FIFO even for writes buffered before
        // the transport attaches.
        let mut output = OutputQueue::new();
        output.queue_header(&ProtocolHeader::amqp());

        Self {
            id: next_connection_id(),
            container,
            container_id,
            options,
            state: EndpointState::new(),
            local_open: None,
            remote_open: None,
            remote_close: None,
            sessions: Vec::new(),
            remote_channels: HashMap::new(),
            decoder: FrameDecoder::new(),
            output,
            transport: None,
            registered: false,
            dispatcher: Dispatcher::new(),
            events: Vec::new(),
            default_channel: None,
        }
    }

    /// Process-unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// The open declaration sent to the peer, once written.
    pub fn local_open(&self) -> Option<&Open> {
        self.local_open.as_ref()
    }

    /// The peer's open declaration, once received.
    pub fn remote_open(&self) -> Option<&Open> {
        self.remote_open.as_ref()
    }

    /// The peer's close declaration, once received.
    pub fn remote_close(&self) -> Option<&Close> {
        self.remote_close.as_ref()
    }

    /// Whether the peer's protocol header has been read.
    pub fn header_received(&self) -> bool {
        self.decoder.header_received()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Look up a freeform option, falling back to the owning container's
    /// options, then to `default`.
    pub fn get_option(&self, name: &str, default: &str) -> String {
        if let Some(value) = self.options.properties.get(name) {
            return value.clone();
        }
        if let Some(container) = &self.container {
            if let Some(value) = container.option(name) {
                return value;
            }
        }
        default.to_string()
    }

    /// Register a listener for `kind`. When no local listener exists for
    /// an event, it is forwarded to the owning container's listeners.
    pub fn on(&mut self, kind: EventKind, listener: impl FnMut(&EventContext) + Send + 'static) {
        self.dispatcher.on(kind, listener);
    }

    // ---- transport -------------------------------------------------------

    /// Dial `addr` and attach the resulting stream. Anything queued
    /// before this call is flushed, in order, ahead of later writes.
    pub fn connect(&mut self, addr: impl ToSocketAddrs) -> Result<()> {
        let stream = TcpStream::connect(addr)?;
        self.attach_transport(stream)
    }

    /// Adopt an inbound stream from an accepting listener.
    pub fn accept(&mut self, stream: TcpStream) -> Result<()> {
        self.attach_transport(stream)
    }

    fn attach_transport(&mut self, stream: TcpStream) -> Result<()> {
        debug!(connection = self.id, peer = ?stream.peer_addr().ok(), "transport attached");
        self.transport = Some(stream);
        self.flush()
    }

    /// Drive the connection until the peer disconnects: read chunks, feed
    /// the reassembler, and flush whatever each batch of frames queued.
    pub fn run(&mut self) -> Result<()> {
        let Some(stream) = self.transport.as_ref() else {
            return Err(PeerError::NotConnected);
        };
        let mut reader = stream.try_clone()?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            self.process()?;
            self.dispatch_events();
            let read = match reader.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    error!(connection = self.id, error = %err, "transport error");
                    return Err(PeerError::Io(err));
                }
            };
            if read == 0 {
                self.on_disconnect();
                return Ok(());
            }
            self.handle_input(&chunk[..read])?;
        }
    }

    /// Note that the peer closed the transport. An EOF after a completed
    /// close handshake is a clean shutdown; anything else is abnormal.
    pub fn on_disconnect(&mut self) {
        if self.state.is_closed() {
            debug!(connection = self.id, "transport ended after clean close");
        } else {
            warn!(connection = self.id, "unexpected disconnect");
        }
        self.transport = None;
    }

    // ---- input -----------------------------------------------------------

    /// Feed a chunk of bytes received from the transport. Complete frames
    /// are handled synchronously in arrival order, then one coalesced
    /// processing pass flushes everything the batch queued.
    pub fn handle_input(&mut self, chunk: &[u8]) -> Result<()> {
        self.decoder.feed(chunk);
        while let Some(segment) = self.decoder.next_segment()? {
            match segment {
                Segment::Header(header) => self.on_header(header)?,
                Segment::Frame(frame) => self.handle_frame(frame)?,
            }
        }
        self.process()?;
        self.dispatch_events();
        Ok(())
    }

    fn on_header(&mut self, header: ProtocolHeader) -> Result<()> {
        if header.protocol_id != 0 || header.major != 1 {
            return Err(PeerError::UnsupportedProtocol(header));
        }
        debug!(connection = self.id, %header, "peer header");
        Ok(())
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        match &frame.performative {
            Performative::Open(open) => self.on_open(open),
            Performative::Close(close) => self.on_close(close),
            Performative::Begin(begin) => self.on_begin(frame.channel, begin),
            Performative::End(end) => {
                let (channel, session) = self.routed_session(frame.channel, "end")?;
                let mut events = Vec::new();
                session.on_end(end, &mut events)?;
                self.push_session_events(channel, events);
                self.schedule();
                Ok(())
            }
            Performative::Attach(attach) => {
                let (channel, session) = self.routed_session(frame.channel, "attach")?;
                let mut events = Vec::new();
                session.on_attach(attach, &mut events);
                self.push_session_events(channel, events);
                self.schedule();
                Ok(())
            }
            Performative::Detach(detach) => {
                let (channel, session) = self.routed_session(frame.channel, "detach")?;
                let mut events = Vec::new();
                session.on_detach(detach, &mut events);
                self.push_session_events(channel, events);
                self.schedule();
                Ok(())
            }
            Performative::Transfer(transfer) => {
                let payload = frame.payload.clone();
                let (channel, session) = self.routed_session(frame.channel, "transfer")?;
                let mut events = Vec::new();
                session.on_transfer(transfer, payload, &mut events);
                self.push_session_events(channel, events);
                self.schedule();
                Ok(())
            }
            Performative::Disposition(disposition) => {
                let (channel, session) = self.routed_session(frame.channel, "disposition")?;
                let mut events = Vec::new();
                session.on_disposition(disposition, &mut events);
                self.push_session_events(channel, events);
                Ok(())
            }
            Performative::Flow(flow) => {
                let (_, session) = self.routed_session(frame.channel, "flow")?;
                session.on_flow(flow);
                Ok(())
            }
        }
    }

    fn on_open(&mut self, open: &Open) -> Result<()> {
        if !self.state.remote_opened() {
            return Err(PeerError::ProtocolViolation("open already received"));
        }
        debug!(connection = self.id, container = %open.container_id, "remote open");
        if let Some(max) = open.max_frame_size {
            // The peer's max bounds what we may send it.
            self.output.set_max_frame_size(max as usize);
        }
        self.remote_open = Some(open.clone());
        self.open();
        let ctx = self.context(EventKind::ConnectionOpen);
        self.events.push(ctx);
        Ok(())
    }

    fn on_close(&mut self, close: &Close) -> Result<()> {
        if !self.state.remote_closed() {
            return Err(PeerError::ProtocolViolation("close already received"));
        }
        if let Some(condition) = &close.error {
            warn!(connection = self.id, condition = %condition.condition, "remote close with error");
        } else {
            debug!(connection = self.id, "remote close");
        }
        self.remote_close = Some(close.clone());
        self.close();
        let ctx = self
            .context(EventKind::ConnectionClose)
            .with_error(close.error.clone());
        self.events.push(ctx);
        Ok(())
    }

    fn on_begin(&mut self, channel: u16, begin: &Begin) -> Result<()> {
        // A physical channel is bound by at most one begin.
        if self.remote_channels.contains_key(&channel) {
            return Err(PeerError::ProtocolViolation("begin already received"));
        }
        let local = match begin.remote_channel {
            Some(local_channel) => {
                if self
                    .sessions
                    .get(usize::from(local_channel))
                    .and_then(Option::as_ref)
                    .is_none()
                {
                    return Err(PeerError::ChannelConsistency {
                        channel: local_channel,
                    });
                }
                local_channel
            }
            None => {
                // Peer-initiated session: allocate a channel and answer
                // the begin back on the peer's channel.
                let local_channel = self.create_session();
                if let Some(session) = self.session_mut(local_channel) {
                    session.set_reply_channel(channel);
                }
                local_channel
            }
        };
        if let Some(session) = self.session_mut(local) {
            session.set_remote_channel(channel);
            session.on_begin(begin)?;
        }
        self.remote_channels.insert(channel, local);
        let ctx = self.context(EventKind::SessionBegin).with_channel(local);
        self.events.push(ctx);
        self.schedule();
        Ok(())
    }

    fn routed_session(
        &mut self,
        channel: u16,
        performative: &'static str,
    ) -> Result<(u16, &mut Session)> {
        let local = *self
            .remote_channels
            .get(&channel)
            .ok_or(PeerError::UnknownChannel {
                channel,
                performative,
            })?;
        let session = self
            .sessions
            .get_mut(usize::from(local))
            .and_then(Option::as_mut)
            .ok_or(PeerError::UnknownChannel {
                channel,
                performative,
            })?;
        Ok((local, session))
    }

    // ---- sessions --------------------------------------------------------

    /// Allocate the lowest free local channel and register a new session
    /// on it.
    pub fn create_session(&mut self) -> u16 {
        let slot = self
            .sessions
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.sessions.len());
        if slot == self.sessions.len() {
            self.sessions.push(None);
        }
        let channel = slot as u16;
        self.sessions[slot] = Some(Session::new(channel));
        debug!(connection = self.id, channel, "session created");
        channel
    }

    pub fn session(&self, channel: u16) -> Option<&Session> {
        self.sessions.get(usize::from(channel)).and_then(Option::as_ref)
    }

    pub fn session_mut(&mut self, channel: u16) -> Option<&mut Session> {
        self.sessions
            .get_mut(usize::from(channel))
            .and_then(Option::as_mut)
    }

    fn ensure_default_session(&mut self) -> u16 {
        if let Some(channel) = self.default_channel {
            if self.session(channel).is_some() {
                return channel;
            }
        }
        let channel = self.create_session();
        if let Some(session) = self.session_mut(channel) {
            session.begin();
        }
        self.default_channel = Some(channel);
        channel
    }

    /// Attach a sending link on the default session. Returns the session
    /// channel and link handle.
    pub fn attach_sender(&mut self, name: Option<String>) -> (u16, u32) {
        let channel = self.ensure_default_session();
        let mut handle = 0;
        if let Some(session) = self.session_mut(channel) {
            handle = session.attach_sender(name);
        }
        self.schedule();
        (channel, handle)
    }

    /// Attach a receiving link on the default session.
    pub fn attach_receiver(&mut self, name: Option<String>) -> (u16, u32) {
        let channel = self.ensure_default_session();
        let mut handle = 0;
        if let Some(session) = self.session_mut(channel) {
            handle = session.attach_receiver(name);
        }
        self.schedule();
        (channel, handle)
    }

    /// Queue a message body on a sending link.
    pub fn transfer(&mut self, channel: u16, handle: u32, payload: Bytes) -> Result<()> {
        let Some(session) = self.session_mut(channel) else {
            return Err(PeerError::NoSuchSession(channel));
        };
        session.transfer(handle, payload);
        self.schedule();
        Ok(())
    }

    // ---- lifecycle -------------------------------------------------------

    /// Record intent to open the connection and schedule a processing
    /// pass if this is a fresh transition.
    pub fn open(&mut self) {
        if self.state.open() {
            self.schedule();
        }
    }

    /// Record intent to close the connection.
    pub fn close(&mut self) {
        if self.state.close() {
            self.schedule();
        }
    }

    fn schedule(&mut self) {
        // At most one deferred pass is outstanding at a time.
        self.registered = true;
    }

    /// Run the deferred processing pass, if one is scheduled: write the
    /// open frame if pending, flush every session's output, write the
    /// close frame if pending, re-checking settlement after each full
    /// iteration.
    pub fn process(&mut self) -> Result<()> {
        if !self.registered {
            return Ok(());
        }
        self.registered = false;
        loop {
            if self.state.need_open() {
                self.write_open()?;
            }
            for slot in self.sessions.iter_mut() {
                if let Some(session) = slot.as_mut() {
                    session.process(&mut self.output)?;
                }
            }
            self.reap_sessions();
            if self.state.need_close() {
                self.write_close()?;
            }
            if self.state.has_settled() {
                break;
            }
        }
        if self.is_terminal() {
            // Terminal: the close handshake settled, sessions become
            // unreachable.
            self.sessions.clear();
            self.remote_channels.clear();
            self.default_channel = None;
        }
        self.flush()
    }

    /// Both sides have completed the close handshake.
    fn is_terminal(&self) -> bool {
        self.state.is_closed() && self.remote_close.is_some()
    }

    fn write_open(&mut self) -> Result<()> {
        let open = Open {
            container_id: self.container_id.clone(),
            hostname: self.options.hostname.clone(),
            max_frame_size: self.options.max_frame_size,
            channel_max: self.options.channel_max,
            idle_timeout: None,
        };
        self.output
            .queue_frame(0, &Performative::Open(open.clone()), &[])?;
        debug!(connection = self.id, "open sent");
        self.local_open = Some(open);
        Ok(())
    }

    fn write_close(&mut self) -> Result<()> {
        self.output
            .queue_frame(0, &Performative::Close(Close::default()), &[])?;
        debug!(connection = self.id, "close sent");
        Ok(())
    }

    fn reap_sessions(&mut self) {
        for slot in self.sessions.iter_mut() {
            if slot.as_ref().is_some_and(Session::is_terminated) {
                if let Some(session) = slot.take() {
                    if let Some(remote) = session.remote_channel() {
                        self.remote_channels.remove(&remote);
                    }
                    debug!(channel = session.local_channel(), "session removed");
                }
            }
        }
    }

    /// Drain queued output to the transport, if one is attached. Once the
    /// close handshake has completed, the write side is shut down after
    /// the last byte.
    fn flush(&mut self) -> Result<()> {
        let Some(stream) = self.transport.as_mut() else {
            return Ok(());
        };
        self.output.flush(stream)?;
        if self.state.is_closed() && self.remote_close.is_some() {
            let _ = stream.shutdown(Shutdown::Write);
        }
        Ok(())
    }

    // ---- dispatch --------------------------------------------------------

    fn context(&self, kind: EventKind) -> EventContext {
        EventContext::new(kind, self.id, self.container_id.clone())
    }

    fn push_session_events(&mut self, channel: u16, events: Vec<SessionEvent>) {
        for event in events {
            let ctx = match event {
                SessionEvent::End { error } => self
                    .context(EventKind::SessionEnd)
                    .with_channel(channel)
                    .with_error(error),
                SessionEvent::Attach { handle } => self
                    .context(EventKind::LinkAttach)
                    .with_channel(channel)
                    .with_handle(handle),
                SessionEvent::Detach { handle, error } => self
                    .context(EventKind::LinkDetach)
                    .with_channel(channel)
                    .with_handle(handle)
                    .with_error(error),
                SessionEvent::Message { handle, payload } => self
                    .context(EventKind::Message)
                    .with_channel(channel)
                    .with_handle(handle)
                    .with_payload(payload),
                SessionEvent::Disposition => {
                    self.context(EventKind::Disposition).with_channel(channel)
                }
            };
            self.events.push(ctx);
        }
    }

    /// Deliver staged events: local listeners first, container listeners
    /// for anything unhandled locally.
    fn dispatch_events(&mut self) {
        for ctx in std::mem::take(&mut self.events) {
            debug!(connection = self.id, event = ctx.kind.name(), "dispatch");
            if !self.dispatcher.dispatch(&ctx) {
                if let Some(container) = &self.container {
                    container.dispatch(&ctx);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn output_mut(&mut self) -> &mut OutputQueue {
        &mut self.output
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use bytes::BytesMut;

    use amqmux_codec::{encode_frame, End, Transfer};

    use super::*;

    /// Bytes a peer would send: its protocol header plus frames.
    fn peer_wire(frames: &[(u16, Performative)]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        ProtocolHeader::amqp().encode(&mut buf);
        for (channel, performative) in frames {
            encode_frame(&mut buf, *channel, performative, &[]);
        }
        buf.to_vec()
    }

    fn peer_open() -> Performative {
        Performative::Open(Open {
            container_id: "peer".to_string(),
            ..Open::default()
        })
    }

    fn peer_begin(remote_channel: Option<u16>) -> Performative {
        Performative::Begin(Begin {
            remote_channel,
            next_outgoing_id: 0,
            incoming_window: 2048,
            outgoing_window: 2048,
            handle_max: None,
        })
    }

    fn queued_performatives(conn: &mut Connection) -> Vec<&'static str> {
        let mut sink = std::io::Cursor::new(Vec::new());
        conn.output_mut()
            .flush(&mut sink)
            .expect("flush should succeed");
        let mut decoder = FrameDecoder::new();
        decoder.feed(sink.get_ref());
        let mut names = Vec::new();
        while let Some(segment) = decoder.next_segment().expect("output should decode") {
            match segment {
                Segment::Header(_) => names.push("header"),
                Segment::Frame(frame) => names.push(frame.performative.name()),
            }
        }
        names
    }

    #[test]
    fn open_then_close_coalesce_into_one_pass() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        conn.close();
        conn.process().unwrap();

        assert_eq!(queued_performatives(&mut conn), ["header", "open", "close"]);

        // Nothing further is scheduled.
        conn.process().unwrap();
        assert!(conn.output_mut().is_empty());
    }

    #[test]
    fn repeated_open_schedules_at_most_one_pass() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        conn.open();
        conn.process().unwrap();

        assert_eq!(queued_performatives(&mut conn), ["header", "open"]);
    }

    #[test]
    fn channel_allocation_reuses_lowest_free_slot() {
        let mut conn = Connection::new(ConnectionOptions::default());
        assert_eq!(conn.create_session(), 0);
        assert_eq!(conn.create_session(), 1);
        assert_eq!(conn.create_session(), 2);

        // Tear session 1 down through its close handshake.
        {
            let session = conn.session_mut(1).unwrap();
            session.begin();
            session
                .on_begin(&Begin {
                    remote_channel: Some(1),
                    next_outgoing_id: 0,
                    incoming_window: 1,
                    outgoing_window: 1,
                    handle_max: None,
                })
                .unwrap();
            session.end();
            let mut events = Vec::new();
            session.on_end(&End { error: None }, &mut events).unwrap();
        }
        conn.schedule();
        conn.process().unwrap();

        assert!(conn.session(1).is_none());
        assert_eq!(conn.create_session(), 1);
        assert_eq!(conn.create_session(), 3);
    }

    #[test]
    fn peer_initiated_begin_creates_session_and_answers_on_its_channel() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        conn.process().unwrap();
        let _ = queued_performatives(&mut conn);

        conn.handle_input(&peer_wire(&[(0, peer_open()), (5, peer_begin(None))]))
            .unwrap();

        let session = conn.session(0).expect("session should be created");
        assert_eq!(session.remote_channel(), Some(5));

        // The answering begin must reference the peer's channel.
        let mut sink = std::io::Cursor::new(Vec::new());
        conn.output_mut().flush(&mut sink).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"AMQP\x00\x01\x00\x00");
        decoder.feed(sink.get_ref());
        let mut begin_seen = false;
        while let Some(segment) = decoder.next_segment().unwrap() {
            if let Segment::Frame(frame) = segment {
                if let Performative::Begin(begin) = &frame.performative {
                    assert_eq!(begin.remote_channel, Some(5));
                    assert_eq!(frame.channel, 0);
                    begin_seen = true;
                }
            }
        }
        assert!(begin_seen);
    }

    #[test]
    fn begin_answer_binds_existing_session() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        let channel = conn.create_session();
        conn.session_mut(channel).unwrap().begin();
        conn.schedule();
        conn.process().unwrap();

        conn.handle_input(&peer_wire(&[
            (0, peer_open()),
            (9, peer_begin(Some(channel))),
        ]))
        .unwrap();

        assert_eq!(conn.session(channel).unwrap().remote_channel(), Some(9));
    }

    #[test]
    fn second_begin_on_a_bound_channel_is_fatal() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        conn.handle_input(&peer_wire(&[(0, peer_open()), (5, peer_begin(None))]))
            .unwrap();

        let mut dup = BytesMut::new();
        encode_frame(&mut dup, 5, &peer_begin(None), &[]);
        let err = conn.handle_input(&dup).unwrap_err();
        assert!(matches!(err, PeerError::ProtocolViolation(_)));
    }

    #[test]
    fn begin_referencing_unknown_session_is_fatal() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        let err = conn
            .handle_input(&peer_wire(&[(0, peer_open()), (9, peer_begin(Some(4)))]))
            .unwrap_err();
        assert!(matches!(err, PeerError::ChannelConsistency { channel: 4 }));
    }

    #[test]
    fn frames_on_unmapped_channels_are_fatal() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        let transfer = Performative::Transfer(Transfer {
            handle: 0,
            delivery_id: Some(0),
            delivery_tag: None,
            message_format: Some(0),
            settled: Some(true),
        });
        let err = conn
            .handle_input(&peer_wire(&[(0, peer_open()), (3, transfer)]))
            .unwrap_err();
        assert!(matches!(
            err,
            PeerError::UnknownChannel {
                channel: 3,
                performative: "transfer"
            }
        ));
    }

    #[test]
    fn frames_on_begun_channels_route_to_the_bound_session() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        conn.process().unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        conn.on(EventKind::Message, move |ctx| {
            sink.lock().unwrap().push((ctx.channel, ctx.payload.clone()));
        });

        let mut wire = BytesMut::new();
        ProtocolHeader::amqp().encode(&mut wire);
        encode_frame(&mut wire, 0, &peer_open(), &[]);
        encode_frame(&mut wire, 5, &peer_begin(None), &[]);
        let transfer = Performative::Transfer(Transfer {
            handle: 0,
            delivery_id: Some(0),
            delivery_tag: None,
            message_format: Some(0),
            settled: Some(true),
        });
        encode_frame(&mut wire, 5, &transfer, b"payload");
        conn.handle_input(&wire).unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, Some(0));
        assert_eq!(received[0].1.as_deref(), Some(b"payload".as_slice()));
    }

    #[test]
    fn duplicate_remote_open_is_fatal() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        conn.handle_input(&peer_wire(&[(0, peer_open())])).unwrap();
        let mut dup = BytesMut::new();
        encode_frame(&mut dup, 0, &peer_open(), &[]);
        let err = conn.handle_input(&dup).unwrap_err();
        assert!(matches!(err, PeerError::ProtocolViolation(_)));
    }

    #[test]
    fn duplicate_remote_close_is_fatal() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        let close = Performative::Close(Close::default());
        conn.handle_input(&peer_wire(&[(0, peer_open()), (0, close.clone())]))
            .unwrap();
        let mut dup = BytesMut::new();
        encode_frame(&mut dup, 0, &close, &[]);
        let err = conn.handle_input(&dup).unwrap_err();
        assert!(matches!(err, PeerError::ProtocolViolation(_)));
    }

    #[test]
    fn remote_open_raises_connection_open_event_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        let mut conn = Connection::new(ConnectionOptions::default());
        conn.on(EventKind::ConnectionOpen, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        conn.open();
        conn.handle_input(&peer_wire(&[(0, peer_open())])).unwrap();

        assert!(conn.is_open());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remote_close_answers_and_raises_connection_close() {
        let closed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&closed);

        let mut conn = Connection::new(ConnectionOptions::default());
        conn.on(EventKind::ConnectionClose, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        conn.open();
        conn.handle_input(&peer_wire(&[
            (0, peer_open()),
            (0, Performative::Close(Close::default())),
        ]))
        .unwrap();

        assert!(conn.is_closed());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(
            queued_performatives(&mut conn),
            ["header", "open", "close"]
        );
    }

    #[test]
    fn container_listeners_see_unhandled_events() {
        let container = Container::with_id("shared");
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        container.on(EventKind::ConnectionOpen, move |ctx| {
            assert_eq!(ctx.container_id, "shared");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let mut conn = container.connection();
        conn.open();
        conn.handle_input(&peer_wire(&[(0, peer_open())])).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn local_listener_preempts_container_fallback() {
        let container = Container::with_id("shared");
        let container_count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&container_count);
        container.on(EventKind::ConnectionOpen, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let local_count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&local_count);
        let mut conn = container.connection();
        conn.on(EventKind::ConnectionOpen, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        conn.open();
        conn.handle_input(&peer_wire(&[(0, peer_open())])).unwrap();
        assert_eq!(local_count.load(Ordering::SeqCst), 1);
        assert_eq!(container_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn get_option_falls_back_to_container_then_default() {
        let container = Container::with_id("c");
        container.set_option("idle", "30s");

        let mut options = ConnectionOptions::default();
        options
            .properties
            .insert("hostname".to_string(), "local".to_string());
        let conn = container.connection_with_options(options);

        assert_eq!(conn.get_option("hostname", "x"), "local");
        assert_eq!(conn.get_option("idle", "x"), "30s");
        assert_eq!(conn.get_option("missing", "fallback"), "fallback");
    }

    #[test]
    fn header_gate_is_visible_on_the_connection() {
        let mut conn = Connection::new(ConnectionOptions::default());
        assert!(!conn.header_received());
        conn.handle_input(b"AMQP").unwrap();
        assert!(!conn.header_received());
        conn.handle_input(b"\x00\x01\x00\x00").unwrap();
        assert!(conn.header_received());
    }

    #[test]
    fn unsupported_header_is_fatal() {
        let mut conn = Connection::new(ConnectionOptions::default());
        let err = conn.handle_input(b"AMQP\x03\x01\x00\x00").unwrap_err();
        assert!(matches!(err, PeerError::UnsupportedProtocol(_)));
    }

    #[test]
    fn transfers_queued_before_connect_stay_buffered_in_order() {
        let mut conn = Connection::new(ConnectionOptions::default());
        conn.open();
        let (channel, handle) = conn.attach_sender(Some("out".to_string()));
        conn.transfer(channel, handle, Bytes::from_static(b"early"))
            .unwrap();
        conn.process().unwrap();

        assert_eq!(
            queued_performatives(&mut conn),
            ["header", "open", "begin", "attach", "transfer"]
        );
    }
}
