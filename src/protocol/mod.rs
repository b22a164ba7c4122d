pub mod codec;
pub mod message;

pub use codec::{decode_frame_body, encode_frame, FrameDecoder};
pub use message::{Outcome, ProtocolMessage};
