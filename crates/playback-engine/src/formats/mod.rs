//! Container parsers. Each one turns a file image into a [`Song`](crate::song::Song).

pub mod dro;
pub mod gym;
pub mod s98;
pub mod vgm;
