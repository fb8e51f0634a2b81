pub mod grid;
pub mod object;
pub mod player;
pub mod registry;
pub mod room;
