//! Native messaging daemon.
//!
//! The browser launches `unloadd` with the extension on the other end of
//! stdin/stdout. A single loop reads inbound frames and writes everything
//! queued for the extension: event replies, host calls and unload reports.
//! Work that waits (pending click verdicts, unloads) runs in spawned tasks
//! and reports back through the outbound queue, so the loop never blocks
//! on an interaction.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::config::Settings;
use crate::gesture::{GateContext, GateSet, MouseEvent, MouseMessage, Suppress};
use crate::host::native::{DEFAULT_CALL_TIMEOUT, NativeHost};
use crate::host::{TabHost, TabId};
use crate::ipc::codec::{CodecError, DecodeResult, FrameCodec, decode_frame};
use crate::ipc::protocol::{EventKind, Inbound, Outbound};
use crate::unload::{UnloadCoordinator, UnloadOptions};

/// Errors that end the host.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Serve the extension on stdin/stdout until it disconnects or a
/// termination signal arrives.
pub async fn run(settings: Settings) -> Result<(), DaemonError> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tracing::info!(combos = settings.combos.len(), "unloadd started");
    let result = tokio::select! {
        result = serve(tokio::io::stdin(), tokio::io::stdout(), settings) => result,
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
            Ok(())
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down");
            Ok(())
        }
    };
    tracing::info!("unloadd stopped");
    result
}

/// Run the message loop over `reader`/`writer`. Returns `Ok` when the
/// extension closes its end.
pub async fn serve<R, W>(reader: R, writer: W, settings: Settings) -> Result<(), DaemonError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let daemon = Daemon::new(settings, outbound_tx);

    let mut frames = FramedRead::new(reader, FrameCodec::new());
    let mut sink = FramedWrite::new(writer, FrameCodec::new());

    let result = loop {
        tokio::select! {
            frame = frames.next() => {
                match frame {
                    Some(Ok(raw)) => daemon.handle_frame(&raw),
                    Some(Err(e)) => break Err(e.into()),
                    None => {
                        tracing::debug!("extension closed the channel");
                        break Ok(());
                    }
                }
            }

            Some(msg) = outbound_rx.recv() => {
                match sink.send(msg).await {
                    Ok(()) => {}
                    Err(CodecError::Io(e)) => break Err(e.into()),
                    Err(e) => tracing::warn!(error = %e, "dropping outbound message"),
                }
            }
        }
    };

    let stranded = daemon.host.outstanding();
    if stranded > 0 {
        tracing::debug!(stranded, "failing unanswered host calls");
    }
    daemon.host.disconnect();
    result
}

/// State shared by the message loop and the tasks it spawns.
struct Daemon {
    gates: GateSet,
    host: Arc<NativeHost>,
    coordinator: Arc<UnloadCoordinator>,
    unload: Arc<RwLock<UnloadOptions>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Daemon {
    fn new(settings: Settings, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        let host = Arc::new(NativeHost::new(outbound.clone(), DEFAULT_CALL_TIMEOUT));
        let tab_host: Arc<dyn TabHost> = host.clone();
        let coordinator = Arc::new(UnloadCoordinator::new(
            Arc::clone(&tab_host),
            settings.timing,
        ));
        let unload = Arc::new(RwLock::new(settings.unload));
        let gates = GateSet::new(
            GateContext {
                host: tab_host,
                coordinator: Arc::clone(&coordinator),
                unload: Arc::clone(&unload),
            },
            &settings.combos,
        );
        Self {
            gates,
            host,
            coordinator,
            unload,
            outbound,
        }
    }

    fn send(&self, msg: Outbound) {
        // Only fails once the loop is gone.
        let _ = self.outbound.send(msg);
    }

    fn handle_frame(&self, raw: &[u8]) {
        match decode_frame(raw) {
            DecodeResult::Ok(msg) => self.handle(*msg),
            DecodeResult::UnknownType(envelope) => {
                tracing::warn!(msg_type = %envelope.msg_type, "unknown message type");
                if let Some(id) = envelope.id {
                    self.send(Outbound::Reply {
                        id,
                        suppress: false,
                    });
                }
            }
            DecodeResult::Malformed(e) => {
                tracing::warn!(error = %e, "skipping malformed frame");
            }
        }
    }

    fn handle(&self, msg: Inbound) {
        match msg {
            Inbound::Event {
                id,
                kind,
                message,
                time,
            } => self.handle_event(id, kind, message, time),
            Inbound::Response { id, result, error } => {
                if !self.host.complete(id, result, error) {
                    tracing::debug!(id, "response for unknown call");
                }
            }
            Inbound::Settings { settings } => self.apply_settings(settings),
            Inbound::Unload { id, tabs } => self.spawn_unload(id, tabs),
        }
    }

    fn handle_event(&self, id: u32, kind: EventKind, message: MouseMessage, time: u64) {
        let event = MouseEvent { message, time };
        tracing::trace!(id, ?kind, button = event.message.button, tab = %event.message.tab.id, "mouse event");
        match kind {
            EventKind::MouseDown => match self.gates.on_mouse_down(&event) {
                Suppress::Decided(suppress) => self.send(Outbound::Reply { id, suppress }),
                pending @ Suppress::Pending(_) => {
                    let outbound = self.outbound.clone();
                    tokio::spawn(async move {
                        let suppress = pending.resolve().await;
                        let _ = outbound.send(Outbound::Reply { id, suppress });
                    });
                }
            },
            EventKind::MouseUp => {
                self.gates.on_mouse_up(&event);
                self.send(Outbound::Reply {
                    id,
                    suppress: false,
                });
            }
            EventKind::DragStart => {
                self.gates.on_drag_start(&event);
                self.send(Outbound::Reply {
                    id,
                    suppress: false,
                });
            }
        }
    }

    fn apply_settings(&self, settings: Settings) {
        let issues = settings.validate();
        if !issues.is_empty() {
            for issue in &issues {
                tracing::warn!(%issue, "rejecting settings update");
            }
            return;
        }
        self.gates.apply(&settings.combos);
        *self.unload.write() = settings.unload;
        self.coordinator.set_timing(settings.timing);
        tracing::info!(combos = self.gates.len(), "settings updated");
    }

    fn spawn_unload(&self, id: u32, tabs: Vec<TabId>) {
        let request = self.unload.read().request(tabs);
        let coordinator = Arc::clone(&self.coordinator);
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let report = coordinator.unload_tabs(request).await;
            let _ = outbound.send(Outbound::UnloadDone { id, report });
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use bytes::BytesMut;
    use serde_json::{Value, json};
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    use super::*;
    use crate::gesture::ComboConfig;
    use crate::gesture::combo::DragConfig;
    use crate::host::mock::MockHost;
    use crate::ipc::codec::encode_json;
    use crate::ipc::protocol::{HostCall, MAX_INBOUND_SIZE};
    use crate::unload::coordinator::SkipReason;

    /// Plays the extension: answers host calls from a [`MockHost`] and
    /// hands every other outbound message to the test.
    struct Extension {
        reader: FramedRead<ReadHalf<DuplexStream>, FrameCodec>,
        writer: WriteHalf<DuplexStream>,
        mock: Arc<MockHost>,
    }

    impl Extension {
        async fn send(&mut self, msg: Value) {
            let mut buf = BytesMut::new();
            encode_json(&msg, MAX_INBOUND_SIZE, &mut buf).unwrap();
            self.writer.write_all(&buf).await.unwrap();
        }

        async fn send_raw(&mut self, payload: &[u8]) {
            self.writer
                .write_all(&(payload.len() as u32).to_ne_bytes())
                .await
                .unwrap();
            self.writer.write_all(payload).await.unwrap();
        }

        /// Next message that is not a host call, serving calls meanwhile.
        async fn recv(&mut self) -> Outbound {
            loop {
                let raw = tokio::time::timeout(Duration::from_secs(5), self.reader.next())
                    .await
                    .expect("daemon went quiet")
                    .expect("daemon closed the channel")
                    .unwrap();
                match serde_json::from_slice::<Outbound>(&raw).unwrap() {
                    Outbound::Call { id, call } => {
                        let answer = self.answer(call).await;
                        self.send(answer_frame(id, answer)).await;
                    }
                    other => return other,
                }
            }
        }

        /// Serve host calls until `done` holds for the mock.
        async fn serve_until(&mut self, done: impl Fn(&MockHost) -> bool) {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
            while !done(&self.mock) {
                assert!(tokio::time::Instant::now() < deadline, "condition never met");
                let Ok(Some(raw)) =
                    tokio::time::timeout(Duration::from_millis(20), self.reader.next()).await
                else {
                    continue;
                };
                if let Outbound::Call { id, call } =
                    serde_json::from_slice::<Outbound>(&raw.unwrap()).unwrap()
                {
                    let answer = self.answer(call).await;
                    self.send(answer_frame(id, answer)).await;
                }
            }
        }

        async fn answer(&self, call: HostCall) -> Result<Value, String> {
            let mock = &self.mock;
            let value = match call {
                HostCall::GetTab { tab } => match mock.get_tab(tab).await {
                    Ok(tab) => json!(tab),
                    Err(_) => Value::Null,
                },
                HostCall::QueryTabs { query } => json!(mock.query_tabs(query).await.unwrap()),
                HostCall::SetActiveTab { tab } => {
                    mock.set_active_tab(tab).await.map_err(|e| e.to_string())?;
                    Value::Null
                }
                HostCall::DiscardTabs { tabs, backend } => {
                    mock.discard_tabs(&tabs, backend)
                        .await
                        .map_err(|e| e.to_string())?;
                    Value::Null
                }
                HostCall::TreeDescendants { tab } => {
                    json!(mock.tree_descendants(tab).await.unwrap())
                }
            };
            Ok(value)
        }
    }

    fn answer_frame(id: u32, answer: Result<Value, String>) -> Value {
        match answer {
            Ok(result) => json!({"type": "response", "id": id, "result": result}),
            Err(error) => json!({"type": "response", "id": id, "error": error}),
        }
    }

    fn start(
        settings: Settings,
        mock: MockHost,
    ) -> (Extension, tokio::task::JoinHandle<Result<(), DaemonError>>) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (daemon_reader, daemon_writer) = tokio::io::split(theirs);
        let daemon = tokio::spawn(serve(daemon_reader, daemon_writer, settings));
        let (reader, writer) = tokio::io::split(ours);
        let extension = Extension {
            reader: FramedRead::new(reader, FrameCodec::new()),
            writer,
            mock: Arc::new(mock),
        };
        (extension, daemon)
    }

    fn instant_settings() -> Settings {
        Settings {
            combos: vec![ComboConfig {
                max_timeout_ms: 0,
                drag: DragConfig::default(),
                ..ComboConfig::default()
            }],
            ..Settings::default()
        }
    }

    fn event(ext: &Extension, id: u32, kind: &str, tab: u64, button: u8) -> Value {
        let tab = ext.mock.tab(TabId(tab)).unwrap();
        json!({
            "type": "event",
            "id": id,
            "kind": kind,
            "message": {"button": button, "tab": tab},
            "time": 1_000
        })
    }

    #[tokio::test]
    async fn press_unloads_through_extension() {
        let (mut ext, _daemon) = start(instant_settings(), MockHost::window(3, 1));

        let down = event(&ext, 1, "tab-mousedown", 2, 0);
        ext.send(down).await;
        assert_eq!(ext.recv().await, Outbound::Reply { id: 1, suppress: true });

        ext.serve_until(|mock| !mock.discard_calls().is_empty()).await;
        assert_eq!(ext.mock.discard_calls(), vec![vec![TabId(2)]]);

        ext.send(json!({"type": "noop", "id": 99})).await;
        assert_eq!(ext.recv().await, Outbound::Reply { id: 99, suppress: false });
    }

    #[tokio::test]
    async fn pending_press_replied_after_release() {
        let (mut ext, _daemon) = start(Settings::default(), MockHost::window(3, 1));

        ext.send(event(&ext, 1, "tab-mousedown", 2, 0)).await;
        ext.send(event(&ext, 2, "tab-mouseup", 2, 0)).await;

        let mut replies = HashMap::new();
        while replies.len() < 2 {
            match ext.recv().await {
                Outbound::Reply { id, suppress } => {
                    replies.insert(id, suppress);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(replies[&1]);
        assert!(!replies[&2]);
    }

    #[tokio::test]
    async fn unload_command_reports_back() {
        let (mut ext, _daemon) = start(Settings::default(), MockHost::window(3, 1));

        ext.send(json!({"type": "unload", "id": 7, "tabs": [1, 3, 42]}))
            .await;
        match ext.recv().await {
            Outbound::UnloadDone { id, report } => {
                assert_eq!(id, 7);
                assert_eq!(report.discarded, vec![TabId(1), TabId(3)]);
                assert_eq!(report.skipped_for(SkipReason::Vanished), vec![TabId(42)]);
            }
            other => panic!("expected unload_done, got {other:?}"),
        }
        assert_eq!(ext.mock.activations(), vec![TabId(2)]);
    }

    #[tokio::test]
    async fn settings_update_replaces_combos() {
        let (mut ext, _daemon) = start(instant_settings(), MockHost::window(3, 1));

        ext.send(json!({
            "type": "settings",
            "settings": {"combo": [{"button": 1, "max_timeout_ms": 0}]}
        }))
        .await;
        ext.send(event(&ext, 1, "tab-mousedown", 2, 0)).await;
        assert_eq!(ext.recv().await, Outbound::Reply { id: 1, suppress: false });
        ext.send(event(&ext, 2, "tab-mousedown", 2, 1)).await;
        assert_eq!(ext.recv().await, Outbound::Reply { id: 2, suppress: true });
    }

    #[tokio::test]
    async fn invalid_settings_are_ignored() {
        let (mut ext, _daemon) = start(instant_settings(), MockHost::window(3, 1));

        ext.send(json!({
            "type": "settings",
            "settings": {"combo": [{"button": 9}]}
        }))
        .await;
        ext.send(event(&ext, 1, "tab-mousedown", 2, 0)).await;
        assert_eq!(ext.recv().await, Outbound::Reply { id: 1, suppress: true });
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let (mut ext, _daemon) = start(instant_settings(), MockHost::window(3, 1));

        ext.send_raw(b"{not json").await;
        ext.send(json!({"type": "mystery"})).await;
        ext.send(event(&ext, 5, "tab-dragstart", 2, 0)).await;
        assert_eq!(ext.recv().await, Outbound::Reply { id: 5, suppress: false });
    }

    #[tokio::test]
    async fn closing_stdin_stops_the_loop() {
        let (ext, daemon) = start(Settings::default(), MockHost::window(1, 1));
        drop(ext);
        let result = tokio::time::timeout(Duration::from_secs(5), daemon)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
