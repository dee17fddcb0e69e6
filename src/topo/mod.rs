//! 拓扑构建

pub mod three_routers;

pub use three_routers::{build_three_routers, ThreeRouters};
