//! Per-method prefix trie over path segments.
//!
//! One [`Trie`] exists per [`Method`](crate::route::Method); the `Router`
//! owns a fixed-size array of them. Each node holds a STATIC child map, at
//! most one PARAM child, and at most one WILDCARD child, matching the
//! precedence order required at lookup time.

use std::collections::HashMap;

use crate::error::{RouteError, Result};
use crate::route::types::{HandlerVariant, Segment};
use std::sync::Arc;

#[derive(Clone)]
struct Leaf {
    handler: HandlerVariant,
    pattern: Arc<str>,
}

#[derive(Default, Clone)]
struct ParamChild {
    name: String,
    node: Box<Node>,
}

#[derive(Default, Clone)]
struct Node {
    static_children: HashMap<String, Node>,
    param_child: Option<Box<ParamChild>>,
    wildcard_child: Option<Box<Node>>,
    leaf: Option<Leaf>,
}

/// A matched leaf, returned by [`Trie::lookup`] together with the captured
/// parameters (segment index -> name/value is resolved by the caller via
/// `out_params`).
pub struct TrieMatch<'a> {
    pub handler: &'a HandlerVariant,
    pub pattern: Arc<str>,
}

/// Prefix tree of path segments for a single HTTP method.
///
/// `Clone` deep-copies the whole tree; used once per worker at startup
/// (see [`crate::route::Router::fork_worker_local`]), not on the request
/// path.
#[derive(Default, Clone)]
pub struct Trie {
    root: Node,
}

fn classify(raw: &str) -> Segment {
    if let Some(name) = raw.strip_prefix(':') {
        Segment::Param(name.to_string())
    } else if raw == "*" {
        Segment::Wildcard
    } else {
        Segment::Static(raw.to_string())
    }
}

/// Split `path` into non-empty segments, collapsing repeated `/` in the
/// interior, but surfacing a trailing `/` as an extra empty segment so a
/// path with and without a trailing slash land at distinct trie nodes.
pub fn segments(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Vec::new();
    }
    let trailing = trimmed.len() > 1 && trimmed.ends_with('/');
    let body = if trailing { &trimmed[..trimmed.len() - 1] } else { trimmed };
    let mut out: Vec<&str> = body.split('/').filter(|s| !s.is_empty()).collect();
    if trailing {
        out.push("");
    }
    out
}

impl Trie {
    pub fn new() -> Self {
        Trie::default()
    }

    /// Register `pattern` for this method.
    /// Re-registration of the same pattern replaces the handler.
    pub fn register(&mut self, pattern: &str, handler: HandlerVariant) -> Result<()> {
        let segs = segments(pattern);
        let pattern_arc: Arc<str> = Arc::from(pattern);
        let mut node = &mut self.root;
        let mut iter = segs.into_iter().peekable();
        while let Some(raw) = iter.next() {
            match classify(raw) {
                Segment::Static(s) => {
                    node = node.static_children.entry(s).or_default();
                }
                Segment::Param(name) => {
                    match &mut node.param_child {
                        Some(existing) if existing.name != name => {
                            return Err(RouteError::PatternConflict.into());
                        }
                        Some(_) => {}
                        None => {
                            node.param_child = Some(Box::new(ParamChild {
                                name,
                                node: Box::new(Node::default()),
                            }));
                        }
                    }
                    node = &mut node.param_child.as_mut().unwrap().node;
                }
                Segment::Wildcard => {
                    if node.wildcard_child.is_none() {
                        node.wildcard_child = Some(Box::new(Node::default()));
                    }
                    node = node.wildcard_child.as_mut().unwrap();
                    // Wildcard must be the last segment; anything
                    // after it in the pattern is ignored as unreachable.
                    let _ = iter.by_ref().count();
                    break;
                }
            }
        }
        node.leaf = Some(Leaf { handler, pattern: pattern_arc });
        Ok(())
    }

    /// Walk `path` segment-by-segment, trying STATIC, then PARAM, then
    /// WILDCARD at each node. Captured param names
    /// and values are pushed into `out_params` in walk order. The wildcard
    /// capture (remainder of the path) is recorded under the empty-string
    /// key, which is a deliberately permitted edge case.
    pub fn lookup<'a>(
        &'a self,
        path_segments: &[&str],
        out_params: &mut Vec<(String, String)>,
    ) -> Option<TrieMatch<'a>> {
        self.walk(&self.root, path_segments, out_params)
    }

    fn walk<'a>(
        &'a self,
        node: &'a Node,
        segs: &[&str],
        out_params: &mut Vec<(String, String)>,
    ) -> Option<TrieMatch<'a>> {
        if segs.is_empty() {
            return node.leaf.as_ref().map(|leaf| TrieMatch {
                handler: &leaf.handler,
                pattern: leaf.pattern.clone(),
            });
        }
        let (head, rest) = (segs[0], &segs[1..]);

        if let Some(child) = node.static_children.get(head) {
            if let Some(m) = self.walk(child, rest, out_params) {
                return Some(m);
            }
        }
        if let Some(param) = &node.param_child {
            let mark = out_params.len();
            out_params.push((param.name.clone(), head.to_string()));
            if let Some(m) = self.walk(&param.node, rest, out_params) {
                return Some(m);
            }
            out_params.truncate(mark);
        }
        if let Some(wc) = &node.wildcard_child {
            let remainder = segs.join("/");
            out_params.push((String::new(), remainder));
            return wc.leaf.as_ref().map(|leaf| TrieMatch {
                handler: &leaf.handler,
                pattern: leaf.pattern.clone(),
            });
        }
        None
    }
}
