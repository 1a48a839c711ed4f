use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::canvas::CanvasHost;
use crate::error::TopologyError;
use crate::geometry::{ElementKind, ElementRect, ElementSource};
use crate::gesture::GroupUpdate;
use crate::{
    ConnectionStyle, ElementStatus, NEW_CONNECTION_LABEL, NEW_CONNECTION_LOAD, NEW_ELEMENT_X,
    NEW_ELEMENT_Y, NEW_GROUP_HEIGHT, NEW_GROUP_WIDTH, Point, ServiceType, Size,
};

const NEW_GROUP_COLOR: &str = "#818cf8";

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub service_type: ServiceType,
    pub position: Point,
    #[serde(default)]
    pub status: ElementStatus,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl ServiceNode {
    pub fn rect(&self) -> ElementRect {
        ElementRect::node(self.id.clone(), self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupNode {
    pub id: String,
    pub name: String,
    pub position: Point,
    pub size: Size,
    #[serde(default = "default_group_color")]
    pub color: String,
    #[serde(default)]
    pub status: ElementStatus,
}

fn default_group_color() -> String {
    NEW_GROUP_COLOR.to_string()
}

impl GroupNode {
    pub fn rect(&self) -> ElementRect {
        ElementRect::group(self.id.clone(), self.position, self.size)
    }

    pub fn apply(&mut self, update: GroupUpdate) {
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(size) = update.size {
            self.size = size;
        }
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(color) = update.color {
            self.color = color;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub traffic_load: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ElementStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ConnectionStyle>,
}

impl Connection {
    pub fn new(id: impl Into<String>, source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            label: NEW_CONNECTION_LABEL.to_string(),
            traffic_load: NEW_CONNECTION_LOAD,
            status: None,
            style: None,
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source_id == id || self.target_id == id
    }

    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionUpdate {
    pub label: Option<String>,
    pub traffic_load: Option<f32>,
    pub style: Option<ConnectionStyle>,
    pub status: Option<ElementStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topology {
    pub nodes: Vec<ServiceNode>,
    pub groups: Vec<GroupNode>,
    pub connections: Vec<Connection>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starter document: a gateway, an auth service and a database in one cluster.
    pub fn sample() -> Self {
        let now = Utc::now();
        let node = |id: &str, name: &str, service_type, x, y, status| ServiceNode {
            id: id.to_string(),
            name: name.to_string(),
            service_type,
            position: Point::new(x, y),
            status,
            last_updated: now,
        };

        let mut auth = Connection::new("c1", "1", "2");
        auth.label = "HTTP auth".to_string();
        auth.traffic_load = 0.4;
        let mut query = Connection::new("c2", "2", "3");
        query.label = "SQL query".to_string();
        query.traffic_load = 0.8;

        Self {
            nodes: vec![
                node("1", "User Gateway", ServiceType::Gateway, 150.0, 250.0, ElementStatus::Online),
                node("2", "Auth Service", ServiceType::Server, 450.0, 200.0, ElementStatus::Online),
                node("3", "Product Database", ServiceType::Database, 750.0, 350.0, ElementStatus::Warning),
            ],
            groups: vec![GroupNode {
                id: "g1".to_string(),
                name: "Production Cluster A".to_string(),
                position: Point::new(100.0, 150.0),
                size: Size::new(500.0, 250.0),
                color: "#38bdf8".to_string(),
                status: ElementStatus::Online,
            }],
            connections: vec![auth, query],
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, TopologyError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn to_json(&self) -> Result<String, TopologyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let contents = fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let topology = Self::from_json(&contents)?;
        for connection in topology.connections.iter().filter(|c| c.is_self_loop()) {
            warn!(id = %connection.id, "loaded self-loop will render as a straight stub");
        }
        Ok(topology)
    }

    pub fn save(&self, path: &Path) -> Result<(), TopologyError> {
        let mut json = self.to_json()?;
        json.push('\n');
        fs::write(path, json).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn node(&self, id: &str) -> Option<&ServiceNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&GroupNode> {
        self.groups.iter().find(|group| group.id == id)
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|connection| connection.id == id)
    }

    pub fn contains_element(&self, id: &str) -> bool {
        self.node(id).is_some() || self.group(id).is_some()
    }

    /// Display name of a node or group, e.g. for the pending connect source.
    pub fn element_name(&self, id: &str) -> Option<&str> {
        self.node(id)
            .map(|node| node.name.as_str())
            .or_else(|| self.group(id).map(|group| group.name.as_str()))
    }

    pub fn add_node(&mut self, service_type: ServiceType, name: impl Into<String>) -> &ServiceNode {
        let index = self.nodes.len();
        self.nodes.push(ServiceNode {
            id: new_id("node"),
            name: name.into(),
            service_type,
            position: Point::new(NEW_ELEMENT_X, NEW_ELEMENT_Y),
            status: ElementStatus::Online,
            last_updated: Utc::now(),
        });
        &self.nodes[index]
    }

    pub fn add_group(&mut self, name: impl Into<String>, status: ElementStatus) -> &GroupNode {
        let index = self.groups.len();
        self.groups.push(GroupNode {
            id: new_id("group"),
            name: name.into(),
            position: Point::new(NEW_ELEMENT_X, NEW_ELEMENT_Y),
            size: Size::new(NEW_GROUP_WIDTH, NEW_GROUP_HEIGHT),
            color: NEW_GROUP_COLOR.to_string(),
            status,
        });
        &self.groups[index]
    }

    pub fn move_node(&mut self, id: &str, position: Point) -> Result<(), TopologyError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|node| node.id == id)
            .ok_or_else(|| TopologyError::UnknownElement(id.to_string()))?;
        node.position = position;
        Ok(())
    }

    pub fn update_group(&mut self, id: &str, update: GroupUpdate) -> Result<(), TopologyError> {
        let group = self
            .groups
            .iter_mut()
            .find(|group| group.id == id)
            .ok_or_else(|| TopologyError::UnknownElement(id.to_string()))?;
        group.apply(update);
        Ok(())
    }

    fn prune_connections(&mut self, id: &str) -> usize {
        let before = self.connections.len();
        self.connections.retain(|connection| !connection.touches(id));
        before - self.connections.len()
    }

    pub fn delete_node(&mut self, id: &str) -> Result<ServiceNode, TopologyError> {
        let index = self
            .nodes
            .iter()
            .position(|node| node.id == id)
            .ok_or_else(|| TopologyError::UnknownElement(id.to_string()))?;
        let removed = self.nodes.remove(index);
        let pruned = self.prune_connections(id);
        debug!(id, pruned, "deleted node");
        Ok(removed)
    }

    pub fn delete_group(&mut self, id: &str) -> Result<GroupNode, TopologyError> {
        let index = self
            .groups
            .iter()
            .position(|group| group.id == id)
            .ok_or_else(|| TopologyError::UnknownElement(id.to_string()))?;
        let removed = self.groups.remove(index);
        let pruned = self.prune_connections(id);
        debug!(id, pruned, "deleted group");
        Ok(removed)
    }

    /// Deletes a node or a group, whichever owns `id`.
    pub fn delete_element(&mut self, id: &str) -> Result<ElementKind, TopologyError> {
        if self.node(id).is_some() {
            self.delete_node(id).map(|_| ElementKind::Node)
        } else {
            self.delete_group(id).map(|_| ElementKind::Group)
        }
    }

    pub fn connect(&mut self, source_id: &str, target_id: &str) -> Result<&Connection, TopologyError> {
        if source_id == target_id {
            return Err(TopologyError::SelfLoop(source_id.to_string()));
        }
        for id in [source_id, target_id] {
            if !self.contains_element(id) {
                return Err(TopologyError::UnknownElement(id.to_string()));
            }
        }

        let index = self.connections.len();
        self.connections
            .push(Connection::new(new_id("conn"), source_id, target_id));
        Ok(&self.connections[index])
    }

    pub fn update_connection(&mut self, id: &str, update: ConnectionUpdate) -> Result<(), TopologyError> {
        let connection = self
            .connections
            .iter_mut()
            .find(|connection| connection.id == id)
            .ok_or_else(|| TopologyError::UnknownConnection(id.to_string()))?;
        if let Some(label) = update.label {
            connection.label = label;
        }
        if let Some(load) = update.traffic_load {
            connection.traffic_load = load.clamp(0.0, 1.0);
        }
        if let Some(style) = update.style {
            connection.style = Some(style);
        }
        if let Some(status) = update.status {
            connection.status = Some(status);
        }
        Ok(())
    }

    pub fn remove_connection(&mut self, id: &str) -> Result<Connection, TopologyError> {
        let index = self
            .connections
            .iter()
            .position(|connection| connection.id == id)
            .ok_or_else(|| TopologyError::UnknownConnection(id.to_string()))?;
        Ok(self.connections.remove(index))
    }
}

impl ElementSource for Topology {
    fn element_rect(&self, id: &str) -> Option<ElementRect> {
        self.node(id)
            .map(ServiceNode::rect)
            .or_else(|| self.group(id).map(GroupNode::rect))
    }

    fn element_rects(&self) -> Vec<ElementRect> {
        self.groups
            .iter()
            .map(GroupNode::rect)
            .chain(self.nodes.iter().map(ServiceNode::rect))
            .collect()
    }

    fn connections(&self) -> &[Connection] {
        &self.connections
    }
}

impl CanvasHost for Topology {
    fn on_node_move(&mut self, id: &str, position: Point) {
        if let Err(err) = self.move_node(id, position) {
            warn!(%err, "node move dropped");
        }
    }

    fn on_group_update(&mut self, id: &str, update: GroupUpdate) {
        if let Err(err) = self.update_group(id, update) {
            warn!(%err, "group update dropped");
        }
    }

    fn on_connect(&mut self, source_id: &str, target_id: &str) {
        match self.connect(source_id, target_id) {
            Ok(connection) => debug!(id = %connection.id, "connection created"),
            Err(err) => warn!(%err, "connection rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::layout_connections;

    #[test]
    fn sample_topology_is_consistent() {
        let topology = Topology::sample();
        assert_eq!(topology.nodes.len(), 3);
        assert_eq!(topology.groups.len(), 1);
        for connection in &topology.connections {
            assert!(topology.contains_element(&connection.source_id));
            assert!(topology.contains_element(&connection.target_id));
        }
        assert_eq!(topology.element_name("g1"), Some("Production Cluster A"));
    }

    #[test]
    fn connect_rejects_self_loops_and_unknown_ids() {
        let mut topology = Topology::sample();
        assert!(matches!(topology.connect("1", "1"), Err(TopologyError::SelfLoop(_))));
        assert!(matches!(
            topology.connect("1", "ghost"),
            Err(TopologyError::UnknownElement(id)) if id == "ghost"
        ));

        let created = topology.connect("3", "g1").unwrap();
        assert!(created.id.starts_with("conn-"));
        assert_eq!(created.label, NEW_CONNECTION_LABEL);
        assert_eq!(created.traffic_load, NEW_CONNECTION_LOAD);
    }

    #[test]
    fn deleting_an_element_prunes_its_connections() {
        let mut topology = Topology::sample();
        topology.delete_node("2").unwrap();
        assert!(topology.connections.is_empty());
        assert!(matches!(topology.delete_node("2"), Err(TopologyError::UnknownElement(_))));

        let mut topology = Topology::sample();
        topology.connect("g1", "3").unwrap();
        assert_eq!(topology.delete_element("g1").unwrap(), ElementKind::Group);
        assert_eq!(topology.connections.len(), 2);
    }

    #[test]
    fn dangling_connections_are_skipped_by_layout() {
        let mut topology = Topology::sample();
        topology.nodes.retain(|node| node.id != "3");
        let routed = layout_connections(&topology, 30.0, 0.6);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].id, "c1");
    }

    #[test]
    fn connection_updates_clamp_traffic_load() {
        let mut topology = Topology::sample();
        topology
            .update_connection(
                "c1",
                ConnectionUpdate {
                    traffic_load: Some(3.5),
                    style: Some(ConnectionStyle::Dashed),
                    ..ConnectionUpdate::default()
                },
            )
            .unwrap();
        let connection = topology.connection("c1").unwrap();
        assert_eq!(connection.traffic_load, 1.0);
        assert_eq!(connection.style, Some(ConnectionStyle::Dashed));
        assert!(topology.remove_connection("c1").is_ok());
        assert!(matches!(
            topology.remove_connection("c1"),
            Err(TopologyError::UnknownConnection(_))
        ));
    }

    #[test]
    fn documents_accept_extra_coordinates_and_missing_optionals() {
        let json = r#"{
            "nodes": [
                {"id": "a", "name": "edge", "type": "load_balancer", "position": {"x": 10, "y": 20, "z": 0}}
            ],
            "connections": [
                {"id": "c", "sourceId": "a", "targetId": "a"}
            ]
        }"#;
        let topology = Topology::from_json(json).unwrap();
        assert_eq!(topology.nodes[0].service_type, ServiceType::LoadBalancer);
        assert_eq!(topology.nodes[0].position, Point::new(10.0, 20.0));
        assert!(topology.groups.is_empty());

        let routed = layout_connections(&topology, 30.0, 0.6);
        assert!(routed[0].path.is_straight());
    }

    #[test]
    fn groups_paint_before_nodes() {
        let topology = Topology::sample();
        let kinds: Vec<ElementKind> = topology.element_rects().iter().map(|rect| rect.kind).collect();
        assert_eq!(
            kinds,
            vec![ElementKind::Group, ElementKind::Node, ElementKind::Node, ElementKind::Node]
        );
    }
}
