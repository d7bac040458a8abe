//! Events consumed by the session controller.
//!
//! Every input (console keys, capture callbacks, output completions, transport
//! callbacks, timers) is funnelled into one unbounded queue with a single
//! consumer, so controller state is only ever touched from one place.

use tokio::sync::mpsc;

use crate::audio::capture::AudioFrame;
use crate::audio::scheduler::SegmentId;
use crate::transport::TransportEvent;

/// Commands and notifications for the controller.
#[derive(Debug)]
pub enum ControllerEvent {
    /// Establish the link on the current channel.
    Connect,
    /// Tear the link down (user action).
    Disconnect,
    /// Push-to-talk pressed.
    TalkPressed,
    /// Push-to-talk released.
    TalkReleased,
    /// Select a channel by index into the configured list.
    SelectChannel(usize),
    /// Step to the next channel, wrapping around.
    NextChannel,
    /// Output volume in percent.
    SetVolume(u8),
    /// One fixed-size frame from the capture device.
    CaptureFrame(AudioFrame),
    /// A scheduled response segment finished playing.
    SegmentEnded(SegmentId),
    /// Transport callback, tagged with the session generation that produced it.
    Transport { generation: u64, event: TransportEvent },
    /// A squelch burst's display time elapsed.
    SquelchElapsed { token: u64 },
    /// Disconnect and leave the event loop.
    Shutdown,
}

pub type EventSender = mpsc::UnboundedSender<ControllerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ControllerEvent>;

/// Create the controller's queue.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
