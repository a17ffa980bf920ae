//! Game link client application: directory layout, the fixed-timestep loop and
//! the session that drives a [`gamelink_net::NetClient`] from it.

pub mod game_loop;
pub mod platform;
pub mod session;
