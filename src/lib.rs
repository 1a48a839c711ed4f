use serde::{Deserialize, Serialize};

pub mod canvas;
pub mod config;
pub mod edges;
pub mod error;
pub mod geometry;
pub mod gesture;
pub mod model;
pub mod render;
pub mod selection;
pub mod suggest;
pub mod viewport;

#[cfg(feature = "server")]
pub mod serve;

pub use canvas::*;
pub use config::CanvasConfig;
pub use edges::*;
pub use error::*;
pub use geometry::*;
pub use gesture::*;
pub use model::*;
pub use render::*;
pub use selection::*;
pub use suggest::*;
pub use viewport::*;

pub const NODE_WIDTH: f32 = 120.0;
pub const NODE_HEIGHT: f32 = 40.0;
pub const PARALLEL_EDGE_STEP: f32 = 30.0;
pub const EDGE_LABEL_PUSH: f32 = 0.6;
pub const EDGE_HIT_STROKE_WIDTH: f32 = 22.0;
pub const EDGE_HIT_SAMPLES: usize = 24;
pub const CONTENT_MARGIN: f32 = 400.0;
pub const EMPTY_CANVAS_EXTENT: f32 = 2000.0;
pub const SCROLLBAR_MIN_THUMB: f32 = 40.0;
pub const SCROLLBAR_THICKNESS: f32 = 12.0;
pub const GROUP_MIN_WIDTH: f32 = 200.0;
pub const GROUP_MIN_HEIGHT: f32 = 150.0;
pub const GROUP_RESIZE_HANDLE: f32 = 32.0;
pub const NEW_GROUP_WIDTH: f32 = 300.0;
pub const NEW_GROUP_HEIGHT: f32 = 200.0;
pub const NEW_ELEMENT_X: f32 = 200.0;
pub const NEW_ELEMENT_Y: f32 = 200.0;
pub const NEW_CONNECTION_LABEL: &str = "new link";
pub const NEW_CONNECTION_LOAD: f32 = 0.2;
pub const DEFAULT_VIEWPORT_WIDTH: f32 = 1280.0;
pub const DEFAULT_VIEWPORT_HEIGHT: f32 = 800.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Point {
        Point {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn distance_to(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementStatus {
    #[default]
    Online,
    Warning,
    Error,
}

impl ElementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementStatus::Online => "online",
            ElementStatus::Warning => "warning",
            ElementStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Database,
    #[default]
    Server,
    Gateway,
    Cache,
    LoadBalancer,
    Firewall,
    Container,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::Database => "database",
            ServiceType::Server => "server",
            ServiceType::Gateway => "gateway",
            ServiceType::Cache => "cache",
            ServiceType::LoadBalancer => "load_balancer",
            ServiceType::Firewall => "firewall",
            ServiceType::Container => "container",
        }
    }

    /// Lenient lookup used for externally generated topologies.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "database" | "db" => Some(ServiceType::Database),
            "server" => Some(ServiceType::Server),
            "gateway" => Some(ServiceType::Gateway),
            "cache" => Some(ServiceType::Cache),
            "load_balancer" | "loadbalancer" => Some(ServiceType::LoadBalancer),
            "firewall" => Some(ServiceType::Firewall),
            "container" => Some(ServiceType::Container),
            _ => None,
        }
    }

    fn default_fill_color(self) -> &'static str {
        match self {
            ServiceType::Database => "#fb923c",
            ServiceType::Server => "#38bdf8",
            ServiceType::Gateway => "#818cf8",
            ServiceType::Cache => "#facc15",
            ServiceType::LoadBalancer => "#4ade80",
            ServiceType::Firewall => "#f87171",
            ServiceType::Container => "#c084fc",
        }
    }
}

/// Presentation-only link effect; consumed by renderers for class selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStyle {
    #[default]
    Signal,
    Fluid,
    Packet,
    Dashed,
}

impl ConnectionStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStyle::Signal => "signal",
            ConnectionStyle::Fluid => "fluid",
            ConnectionStyle::Packet => "packet",
            ConnectionStyle::Dashed => "dashed",
        }
    }
}
