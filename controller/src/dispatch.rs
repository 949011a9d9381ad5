// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The IPMI command dispatch table.

use crate::Ipmb;
use ipmc_messages::command::response_netfn;
use ipmc_messages::command::CompletionCode;
use ipmc_messages::message::IpmiMessage;
use slog::debug;
use slog::trace;
use slog::Logger;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

/// A registered command handler.
///
/// Handlers receive the bus context the request arrived on and the parsed
/// message, and are responsible for sending any reply themselves. A handler
/// may register or remove other handlers; the table's lock is never held
/// across a handler invocation.
pub type CommandHandler = Arc<dyn Fn(&dyn Ipmb, &IpmiMessage) + Send + Sync>;

/// An index of registered IPMI commands, keyed by `(NetFn << 8) | Cmd`, with
/// a fallback handler for anything unregistered.
pub struct CommandTable {
    log: Logger,
    inner: Mutex<Inner>,
}

struct Inner {
    handlers: HashMap<u16, CommandHandler>,
    default_handler: Option<CommandHandler>,
}

impl CommandTable {
    /// Create a command table with the given fallback handler.
    pub fn new(log: Logger, default_handler: Option<CommandHandler>) -> Self {
        Self {
            log,
            inner: Mutex::new(Inner {
                handlers: HashMap::new(),
                default_handler,
            }),
        }
    }

    /// Set the handler for a command, or remove it by passing `None`.
    pub fn register(&self, command: u16, handler: Option<CommandHandler>) {
        let mut inner = self.inner.lock().unwrap();
        match handler {
            Some(handler) => {
                inner.handlers.insert(command, handler);
            }
            None => {
                inner.handlers.remove(&command);
            }
        }
    }

    /// Replace the fallback handler.
    pub fn register_default(&self, handler: Option<CommandHandler>) {
        self.inner.lock().unwrap().default_handler = handler;
    }

    /// Dispatch a received message to its registered handler, or to the
    /// fallback if the command is unknown.
    ///
    /// The handler reference is cloned out under the lock and invoked after
    /// release, so concurrent dispatches from multiple bus contexts are safe
    /// and a handler may itself mutate the table.
    pub fn dispatch(&self, bus: &dyn Ipmb, message: &IpmiMessage) {
        let command = message.netcmd();
        let handler = {
            let inner = self.inner.lock().unwrap();
            inner
                .handlers
                .get(&command)
                .or(inner.default_handler.as_ref())
                .cloned()
        };
        match handler {
            Some(handler) => {
                trace!(
                    self.log,
                    "dispatching command";
                    "command" => format!("{command:#06x}"),
                    "message" => %message,
                );
                handler(bus, message);
            }
            None => {
                debug!(
                    self.log,
                    "no handler registered for command";
                    "command" => format!("{command:#06x}"),
                    "message" => %message,
                );
            }
        }
    }
}

/// The conventional fallback handler: reply to any request with the Invalid
/// Command completion code.
pub fn invalid_command_handler() -> CommandHandler {
    Arc::new(|bus, message| {
        if message.is_response() {
            // Never answer a response; that way lies a reply loop.
            return;
        }
        let mut reply = message.prepare_reply();
        reply.net_fn = response_netfn(reply.net_fn);
        reply
            .set_data(&[CompletionCode::InvalidCommand.into()])
            .expect("a single completion code always fits");
        bus.send(reply);
    })
}

#[cfg(test)]
mod tests {
    use super::invalid_command_handler;
    use super::CommandTable;
    use crate::Ipmb;
    use ipmc_messages::command::app;
    use ipmc_messages::command::CompletionCode;
    use ipmc_messages::message::IpmiMessage;
    use std::sync::Arc;
    use std::sync::Mutex;

    // A bus context that records everything sent through it.
    #[derive(Default)]
    struct RecordingBus {
        sent: Mutex<Vec<IpmiMessage>>,
    }

    impl Ipmb for RecordingBus {
        fn local_address(&self) -> u8 {
            0x20
        }

        fn send(&self, message: IpmiMessage) {
            self.sent.lock().unwrap().push(message);
        }
    }

    fn test_log() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn get_device_id_request() -> IpmiMessage {
        IpmiMessage::new(0x20, 0, 0x10, 0, 0x06, 0x01, &[]).unwrap()
    }

    #[test]
    fn test_dispatch_to_registered_handler() {
        let table = CommandTable::new(test_log(), None);
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        table.register(
            app::GET_DEVICE_ID,
            Some(Arc::new(move |_, _| {
                *counter.lock().unwrap() += 1;
            })),
        );

        let bus = RecordingBus::default();
        table.dispatch(&bus, &get_device_id_request());
        assert_eq!(*hits.lock().unwrap(), 1);

        // Deregistration removes the mapping.
        table.register(app::GET_DEVICE_ID, None);
        table.dispatch(&bus, &get_device_id_request());
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_default_handler_replies_invalid_command() {
        let table = CommandTable::new(test_log(), Some(invalid_command_handler()));
        let bus = RecordingBus::default();
        let request = get_device_id_request();
        table.dispatch(&bus, &request);

        let sent = bus.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let reply = &sent[0];
        assert!(request.match_reply(reply));
        assert_eq!(
            reply.data(),
            &[u8::from(CompletionCode::InvalidCommand)]
        );
    }

    #[test]
    fn test_handler_may_reregister_during_dispatch() {
        let table = Arc::new(CommandTable::new(test_log(), None));
        let inner_table = Arc::clone(&table);
        table.register(
            app::GET_DEVICE_ID,
            Some(Arc::new(move |_, _| {
                // Re-entrant registration must not deadlock.
                inner_table.register(app::COLD_RESET, None);
            })),
        );
        let bus = RecordingBus::default();
        table.dispatch(&bus, &get_device_id_request());
    }

    #[test]
    fn test_default_handler_ignores_responses() {
        let table = CommandTable::new(test_log(), Some(invalid_command_handler()));
        let bus = RecordingBus::default();
        let mut response = get_device_id_request();
        response.net_fn |= 0x01;
        table.dispatch(&bus, &response);
        assert!(bus.sent.lock().unwrap().is_empty());
    }
}
