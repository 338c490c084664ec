mod bitfield;
mod message;
mod protocol;
mod session;
mod transport;

pub use bitfield::Bitfield;
pub use message::{BlockInfo, PeerMessage};
pub use protocol::{Handshake, HANDSHAKE_LEN};
pub use session::{PeerSession, SessionConfig, SessionExit};
pub use transport::Transport;
