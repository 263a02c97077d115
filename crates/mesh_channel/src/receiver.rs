//! Per-connection receive loop.
//!
//! One task per socket reads frames, decodes envelopes and hands them to the
//! channel, which routes control and heartbeat traffic internally and
//! everything else to local listeners. Frames are processed one at a time,
//! so delivery order on a connection is preserved.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::connection::{ChannelConnection, ReceiverHandle};
use crate::message::ChannelMessage;
use crate::transport::{Frame, PeerStream};

/// Start reading `stream` on behalf of `connection`.
pub(crate) fn spawn(
    channel: Channel,
    connection: Arc<ChannelConnection>,
    stream: PeerStream,
) -> ReceiverHandle {
    let target = Arc::new(RwLock::new(connection));
    let stop = Arc::new(Notify::new());
    let task = tokio::spawn(receive_loop(
        channel,
        Arc::clone(&target),
        stream,
        Arc::clone(&stop),
    ));
    ReceiverHandle { target, stop, task }
}

async fn receive_loop(
    channel: Channel,
    target: Arc<RwLock<Arc<ChannelConnection>>>,
    mut stream: PeerStream,
    stop: Arc<Notify>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.notified() => break,
            frame = stream.next_frame() => frame,
        };

        let connection = target.read().clone();
        match frame {
            Frame::Text(text) => match ChannelMessage::from_json(&text) {
                Ok(message) => {
                    debug!(
                        "Received {}/{} from {}",
                        message.channel_type(),
                        message.message_type(),
                        connection.describe()
                    );
                    channel.handle_incoming(&connection, message).await;
                }
                Err(e) => {
                    warn!("Bad message from {}: {e}", connection.describe());
                }
            },
            Frame::Skip => {}
            Frame::Closed => {
                debug!("Connection {} closed by peer", connection.describe());
                break;
            }
            Frame::Failed(e) => {
                info!("Connection {} failed: {e}", connection.describe());
                break;
            }
        }
    }

    let connection = target.read().clone();
    channel.connections().forget_detached(&connection);
}
