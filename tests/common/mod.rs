//! Tree-building helpers shared by the integration tests.

#![allow(dead_code)]

use h5_sanitizer::container::{Container, Group, Node, commit, read_container};
use std::path::{Path, PathBuf};

pub trait GroupExt {
    /// Append a child, panicking on a duplicate name.
    fn with_child(self, name: &str, node: impl Into<Node>) -> Self;
}

impl GroupExt for Group {
    fn with_child(mut self, name: &str, node: impl Into<Node>) -> Self {
        self.insert(name, node.into()).expect("duplicate child name");
        self
    }
}

pub trait ContainerExt {
    /// Node at a `/`-separated path below the root.
    fn lookup(&self, path: &str) -> Option<&Node>;
}

impl ContainerExt for Container {
    fn lookup(&self, path: &str) -> Option<&Node> {
        let mut node: Option<&Node> = None;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            let group = match node {
                None => &self.root,
                Some(Node::Group(g)) => g,
                Some(Node::Dataset(_)) => return None,
            };
            node = Some(group.child(seg)?);
        }
        node
    }
}

pub fn write(dir: &Path, name: &str, c: &Container) -> PathBuf {
    let path = dir.join(name);
    commit(c, &path).expect("commit fixture");
    path
}

pub fn read(path: &Path) -> Container {
    read_container(path).expect("read output")
}
