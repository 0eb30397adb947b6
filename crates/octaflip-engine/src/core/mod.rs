pub use self::{board::*, player::*, square::*};

pub(crate) mod board;
pub(crate) mod player;
pub(crate) mod square;
