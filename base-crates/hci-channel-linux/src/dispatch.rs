//! The readiness loop of a HCI channel
//!
//! A [`Dispatcher`] waits with `epoll` for the socket of a channel to become readable and calls
//! [`HciChannel::on_readable`] every time it is. The loop runs until the [`ExitHandle`] of the
//! dispatcher is used. Commands are written through a [`CommandWriter`] of the channel, which
//! does not need the loop to be stopped.

use crate::Error;
use hci_channel::{CommandWriter, DecodedEvent, EventSink, HciChannel, HciSocket};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};
use nix::sys::eventfd::{eventfd, EfdFlags};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::UnboundedReceiver;

/// For Epoll, a value is assigned to signify what file descriptor had an event occur.
/// * 0 -> BluetoothController,
/// * 1 -> TaskExit,
enum EPollResult {
    BluetoothController,
    TaskExit,
}

impl TryFrom<u64> for EPollResult {
    type Error = u64;

    fn try_from(val: u64) -> Result<Self, u64> {
        match val {
            0 => Ok(EPollResult::BluetoothController),
            1 => Ok(EPollResult::TaskExit),
            _ => Err(val),
        }
    }
}

impl From<EPollResult> for u64 {
    fn from(epr: EPollResult) -> Self {
        match epr {
            EPollResult::BluetoothController => 0,
            EPollResult::TaskExit => 1,
        }
    }
}

/// Handle for stopping a running [`Dispatcher`]
#[derive(Clone, Debug)]
pub struct ExitHandle(Arc<OwnedFd>);

impl ExitHandle {
    /// Signal the dispatcher to exit
    ///
    /// The dispatcher exits after it has finished processing the current notification.
    pub fn exit(&self) -> Result<(), Error> {
        // The value sent doesn't really matter (just that it is 8 bytes, not 0, and not !0 )
        nix::unistd::write(self.0.as_raw_fd(), &1u64.to_ne_bytes())?;

        Ok(())
    }
}

/// Readiness loop for a HCI channel
pub struct Dispatcher {
    epoll: Epoll,
    exit_fd: Arc<OwnedFd>,
}

impl Dispatcher {
    /// Create a dispatcher for `channel`
    ///
    /// The socket of `channel` is registered for readability, an invalid channel cannot be
    /// dispatched.
    pub fn new<S>(channel: &HciChannel<S>) -> Result<Self, Error>
    where
        S: AsFd,
    {
        let socket = channel.socket().ok_or(Error::InvalidChannel)?;

        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;

        let exit_fd = eventfd(0, EfdFlags::EFD_CLOEXEC)?;

        epoll.add(
            socket,
            EpollEvent::new(EpollFlags::EPOLLIN, EPollResult::BluetoothController.into()),
        )?;

        epoll.add(&exit_fd, EpollEvent::new(EpollFlags::EPOLLIN, EPollResult::TaskExit.into()))?;

        Ok(Dispatcher {
            epoll,
            exit_fd: Arc::new(exit_fd),
        })
    }

    pub fn exit_handle(&self) -> ExitHandle {
        ExitHandle(self.exit_fd.clone())
    }

    /// Run the loop
    ///
    /// Everything decoded by `channel` is given to `sink`. This only returns once the exit handle
    /// is used or if waiting on `epoll` fails.
    pub fn run<S, K>(&self, channel: &mut HciChannel<S>, sink: &mut K) -> Result<(), Error>
    where
        S: HciSocket,
        K: EventSink,
    {
        use nix::errno::Errno;

        let epoll_events = &mut [EpollEvent::empty(); 16];

        loop {
            let event_count = match self.epoll.wait(epoll_events, -1) {
                Ok(count) => count,
                Err(Errno::EINTR) | Err(Errno::EAGAIN) => continue,
                Err(e) => {
                    log::error!("Epoll Error: {}", e);
                    return Err(e.into());
                }
            };

            let mut exit = false;

            for epoll_event in epoll_events[..event_count].iter() {
                match EPollResult::try_from(epoll_event.data()) {
                    Ok(EPollResult::BluetoothController) => channel.on_readable(sink),

                    Ok(EPollResult::TaskExit) => exit = true,

                    Err(val) => log::error!("Invalid EPollResult '{}'", val),
                }
            }

            // A packet that is ready together with the exit signal is still processed
            if exit {
                // Clear the counter of the eventfd
                nix::unistd::read(self.exit_fd.as_raw_fd(), &mut [0u8; 8])?;

                return Ok(());
            }
        }
    }
}

/// A channel running on its own thread
///
/// Dropping this stops the thread.
pub struct ChannelTask<S> {
    exit: ExitHandle,
    writer: CommandWriter<S>,
    join_handle: Option<thread::JoinHandle<HciChannel<S>>>,
}

impl<S> ChannelTask<S> {
    /// Get the writer for sending commands to the running channel
    pub fn writer(&self) -> &CommandWriter<S> {
        &self.writer
    }

    /// Stop the thread and get back the channel
    ///
    /// `None` is returned if the thread could not be stopped.
    pub fn stop(mut self) -> Option<HciChannel<S>> {
        if let Err(e) = self.exit.exit() {
            log::error!("failed to stop the HCI channel task: {}", e);
            return None;
        }

        self.join_handle.take()?.join().ok()
    }
}

impl<S> Drop for ChannelTask<S> {
    fn drop(&mut self) {
        if self.join_handle.is_some() {
            if let Err(e) = self.exit.exit() {
                log::error!("failed to stop the HCI channel task: {}", e);
            }
        }
    }
}

/// Run `channel` on a new thread
///
/// Everything decoded by the channel is sent to the returned receiver. Commands are sent with
/// [`ChannelTask::writer`] while the thread runs.
pub fn spawn<S>(channel: HciChannel<S>) -> Result<(ChannelTask<S>, UnboundedReceiver<DecodedEvent>), Error>
where
    S: HciSocket + AsFd + Clone + Send + 'static,
{
    let dispatcher = Dispatcher::new(&channel)?;

    let writer = channel.command_writer().ok_or(Error::InvalidChannel)?;

    let exit = dispatcher.exit_handle();

    let (mut sender, receiver) = tokio::sync::mpsc::unbounded_channel();

    let join_handle = thread::spawn(move || {
        let mut channel = channel;

        if let Err(e) = dispatcher.run(&mut channel, &mut sender) {
            log::error!("HCI channel task exited: {}", e);
        }

        channel
    });

    let task = ChannelTask {
        exit,
        writer,
        join_handle: Some(join_handle),
    };

    Ok((task, receiver))
}
