use std::collections::VecDeque;

use bytes::Bytes;
use tracing::debug;

use amqmux_codec::{
    Attach, Begin, Detach, Disposition, End, ErrorCondition, Flow, Performative, Role, Transfer,
};
use amqmux_frame::OutputQueue;

use crate::endpoint::EndpointState;
use crate::error::{PeerError, Result};

const SESSION_WINDOW: u32 = 2048;
const INITIAL_LINK_CREDIT: u32 = 100;

/// Session-level notification surfaced to the owning connection, which
/// turns it into a dispatched event with connection identity attached.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    End { error: Option<ErrorCondition> },
    Attach { handle: u32 },
    Detach { handle: u32, error: Option<ErrorCondition> },
    Message { handle: u32, payload: Bytes },
    Disposition,
}

/// One directional link endpoint inside a session.
#[derive(Debug)]
pub struct Link {
    name: String,
    handle: u32,
    role: Role,
    remote_handle: Option<u32>,
    credit: u32,
    pending_attach: bool,
    pending_flow: bool,
    pending_detach: bool,
}

impl Link {
    fn new(name: String, handle: u32, role: Role) -> Self {
        Self {
            name,
            handle,
            role,
            remote_handle: None,
            credit: 0,
            pending_attach: true,
            pending_flow: role == Role::Receiver,
            pending_detach: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Credit last granted by the peer, when it has sent a flow.
    pub fn credit(&self) -> u32 {
        self.credit
    }
}

/// A logical sub-connection bound to one local channel and, once the
/// peer's begin is seen, one remote channel.
///
/// The session owns its own begin/end state machine and the pending link
/// traffic it has not yet written; the connection's processing pass calls
/// [`process`](Self::process) to flush all of it in one batch.
pub struct Session {
    local_channel: u16,
    remote_channel: Option<u16>,
    state: EndpointState,
    local_begin: Begin,
    remote_begin: Option<Begin>,
    links: Vec<Link>,
    next_handle: u32,
    next_outgoing_id: u32,
    next_delivery_id: u32,
    pending_transfers: VecDeque<(u32, Bytes)>,
    pending_dispositions: Vec<u32>,
}

impl Session {
    pub(crate) fn new(local_channel: u16) -> Self {
        Self {
            local_channel,
            remote_channel: None,
            state: EndpointState::new(),
            local_begin: Begin {
                remote_channel: None,
                next_outgoing_id: 0,
                incoming_window: SESSION_WINDOW,
                outgoing_window: SESSION_WINDOW,
                handle_max: None,
            },
            remote_begin: None,
            links: Vec::new(),
            next_handle: 0,
            next_outgoing_id: 0,
            next_delivery_id: 0,
            pending_transfers: VecDeque::new(),
            pending_dispositions: Vec::new(),
        }
    }

    pub fn local_channel(&self) -> u16 {
        self.local_channel
    }

    /// The channel the peer transmits on for this session, once known.
    pub fn remote_channel(&self) -> Option<u16> {
        self.remote_channel
    }

    pub(crate) fn set_remote_channel(&mut self, channel: u16) {
        self.remote_channel = Some(channel);
    }

    /// Make the outbound begin answer a peer-initiated begin on `channel`.
    pub(crate) fn set_reply_channel(&mut self, channel: u16) {
        self.local_begin.remote_channel = Some(channel);
    }

    /// The peer's begin declaration, once received.
    pub fn remote_begin(&self) -> Option<&Begin> {
        self.remote_begin.as_ref()
    }

    pub fn link(&self, handle: u32) -> Option<&Link> {
        self.links.iter().find(|link| link.handle == handle)
    }

    /// Record intent to begin. Returns true on a fresh transition, in
    /// which case the owning connection schedules a processing pass.
    pub fn begin(&mut self) -> bool {
        self.state.open()
    }

    /// Record intent to end the session.
    pub fn end(&mut self) -> bool {
        self.state.close()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Attach a sending link. Begins the session if it has not begun.
    pub fn attach_sender(&mut self, name: Option<String>) -> u32 {
        self.attach_link(name, Role::Sender)
    }

    /// Attach a receiving link. The initial credit grant is queued with
    /// the attach.
    pub fn attach_receiver(&mut self, name: Option<String>) -> u32 {
        self.attach_link(name, Role::Receiver)
    }

    fn attach_link(&mut self, name: Option<String>, role: Role) -> u32 {
        self.begin();
        let handle = self.next_handle;
        self.next_handle += 1;
        let name = name.unwrap_or_else(|| match role {
            Role::Sender => format!("sender-{handle}"),
            Role::Receiver => format!("receiver-{handle}"),
        });
        self.links.push(Link::new(name, handle, role));
        handle
    }

    /// Queue a message body for transmission on the given sending link.
    pub fn transfer(&mut self, handle: u32, payload: Bytes) {
        self.pending_transfers.push_back((handle, payload));
    }

    pub(crate) fn on_begin(&mut self, begin: &Begin) -> Result<()> {
        if !self.state.remote_opened() {
            return Err(PeerError::ProtocolViolation("begin already received"));
        }
        self.remote_begin = Some(begin.clone());
        // Answer a peer-initiated begin; a no-op when we initiated.
        self.state.open();
        Ok(())
    }

    pub(crate) fn on_end(&mut self, end: &End, events: &mut Vec<SessionEvent>) -> Result<()> {
        if !self.state.remote_closed() {
            return Err(PeerError::ProtocolViolation("end for a session that is not open"));
        }
        self.state.close();
        events.push(SessionEvent::End {
            error: end.error.clone(),
        });
        Ok(())
    }

    pub(crate) fn on_attach(&mut self, attach: &Attach, events: &mut Vec<SessionEvent>) {
        if let Some(link) = self.links.iter_mut().find(|link| link.name == attach.name) {
            link.remote_handle = Some(attach.handle);
            events.push(SessionEvent::Attach {
                handle: link.handle,
            });
            return;
        }
        // No matching local link: attach the reciprocal endpoint.
        let handle = self.next_handle;
        self.next_handle += 1;
        let mut link = Link::new(attach.name.clone(), handle, attach.role.reciprocal());
        link.remote_handle = Some(attach.handle);
        self.links.push(link);
        events.push(SessionEvent::Attach { handle });
    }

    pub(crate) fn on_detach(&mut self, detach: &Detach, events: &mut Vec<SessionEvent>) {
        let Some(link) = self
            .links
            .iter_mut()
            .find(|link| link.remote_handle == Some(detach.handle))
        else {
            debug!(handle = detach.handle, "detach for unknown link handle");
            return;
        };
        if !link.pending_detach {
            // Reciprocate so the peer sees the link closed from both ends.
            link.pending_detach = true;
        }
        events.push(SessionEvent::Detach {
            handle: link.handle,
            error: detach.error.clone(),
        });
    }

    pub(crate) fn on_transfer(
        &mut self,
        transfer: &Transfer,
        payload: Bytes,
        events: &mut Vec<SessionEvent>,
    ) {
        if transfer.settled != Some(true) {
            if let Some(delivery_id) = transfer.delivery_id {
                self.pending_dispositions.push(delivery_id);
            }
        }
        events.push(SessionEvent::Message {
            handle: transfer.handle,
            payload,
        });
    }

    pub(crate) fn on_disposition(
        &mut self,
        _disposition: &Disposition,
        events: &mut Vec<SessionEvent>,
    ) {
        events.push(SessionEvent::Disposition);
    }

    pub(crate) fn on_flow(&mut self, flow: &Flow) {
        let (Some(handle), Some(credit)) = (flow.handle, flow.link_credit) else {
            return;
        };
        if let Some(link) = self
            .links
            .iter_mut()
            .find(|link| link.remote_handle == Some(handle))
        {
            link.credit = credit;
        }
    }

    /// Flush every pending frame this session owes the wire: begin,
    /// attaches, credit grants, transfers, dispositions, detaches, end.
    pub(crate) fn process(&mut self, output: &mut OutputQueue) -> Result<()> {
        let channel = self.local_channel;
        if self.state.need_open() {
            output.queue_frame(
                channel,
                &Performative::Begin(self.local_begin.clone()),
                &[],
            )?;
        }
        for link in &mut self.links {
            if link.pending_attach {
                link.pending_attach = false;
                output.queue_frame(
                    channel,
                    &Performative::Attach(Attach {
                        name: link.name.clone(),
                        handle: link.handle,
                        role: link.role,
                    }),
                    &[],
                )?;
            }
            if link.pending_flow {
                link.pending_flow = false;
                output.queue_frame(
                    channel,
                    &Performative::Flow(Flow {
                        next_incoming_id: Some(0),
                        incoming_window: SESSION_WINDOW,
                        next_outgoing_id: self.next_outgoing_id,
                        outgoing_window: SESSION_WINDOW,
                        handle: Some(link.handle),
                        delivery_count: Some(0),
                        link_credit: Some(INITIAL_LINK_CREDIT),
                    }),
                    &[],
                )?;
            }
        }
        while let Some((handle, payload)) = self.pending_transfers.pop_front() {
            let delivery_id = self.next_delivery_id;
            self.next_delivery_id += 1;
            self.next_outgoing_id += 1;
            output.queue_frame(
                channel,
                &Performative::Transfer(Transfer {
                    handle,
                    delivery_id: Some(delivery_id),
                    delivery_tag: Some(Bytes::copy_from_slice(&delivery_id.to_be_bytes())),
                    message_format: Some(0),
                    settled: Some(true),
                }),
                &payload,
            )?;
        }
        for delivery_id in self.pending_dispositions.drain(..) {
            output.queue_frame(
                channel,
                &Performative::Disposition(Disposition {
                    role: Role::Receiver,
                    first: delivery_id,
                    last: None,
                    settled: Some(true),
                }),
                &[],
            )?;
        }
        for link in &mut self.links {
            if link.pending_detach {
                link.pending_detach = false;
                output.queue_frame(
                    channel,
                    &Performative::Detach(Detach {
                        handle: link.handle,
                        closed: true,
                        error: None,
                    }),
                    &[],
                )?;
            }
        }
        if self.state.need_close() {
            output.queue_frame(channel, &Performative::End(End { error: None }), &[])?;
        }
        Ok(())
    }

    /// The close handshake has settled; the owning connection frees the
    /// channel slot.
    pub(crate) fn is_terminated(&self) -> bool {
        self.state.is_closed() && self.state.has_settled()
    }
}
