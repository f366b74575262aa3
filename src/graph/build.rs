use std::path::{Path, PathBuf};
use std::sync::Arc;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::ast::{Block, File};
use crate::error::{CfgError, Diagnostic, Diagnostics};
use crate::eval::{EvalContext, FunctionLibrary};
use crate::graph::vertex::{ConfigId, VariableVertex, VertexKind};
use crate::graph::walk::topo_walk;
use crate::value::Value;

pub struct VariableGraph {
    graph: DiGraph<VariableVertex, ()>,
    root: NodeIndex,
    locals: std::collections::HashMap<(ConfigId, String), NodeIndex>,
    globals: std::collections::HashMap<String, NodeIndex>,
    include: Option<NodeIndex>,
}

/// What Phase 1/2 evaluation produced: the bound locals/globals plus the
/// `include` traversal value, ready to seed `EvalContext` for the rest of
/// the decode pipeline.
#[derive(Debug, Clone, Default)]
pub struct GraphResult {
    pub child_locals: Vec<(String, Value)>,
    pub parent_locals: Vec<(String, Value)>,
    pub globals: Vec<(String, Value)>,
    pub include_value: Option<Value>,
    pub parent_path: Option<PathBuf>,
}

impl VariableGraph {
    fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(VariableVertex::root());
        Self { graph, root, locals: Default::default(), globals: Default::default(), include: None }
    }

    fn add_vertex(&mut self, vertex: VariableVertex) -> NodeIndex {
        self.graph.add_node(vertex)
    }

    fn edge_for_root_if_needed(&mut self, node: NodeIndex) {
        if self.graph.edges_directed(node, Direction::Incoming).count() == 0 {
            self.graph.add_edge(self.root, node, ());
        }
    }
}

/// Evaluates the variable graph for one child configuration against at most
/// one selected `include` block — a config only ever has one include in
/// play at graph-evaluation time. Multi-include composition happens one
/// level up, in the
/// `IncludeMerger`, which calls this once per include block.
pub fn evaluate(
    child: &File,
    selected_include: Option<&Block>,
    parent: Option<&File>,
    functions: Arc<FunctionLibrary>,
) -> Result<GraphResult, Diagnostics> {
    let mut diags = Diagnostics::new();
    let mut vg = VariableGraph::new();

    // ─── Phase 1: child ──────────────────────────────────────────────
    let child_locals_block = child.top_level_blocks("locals").into_iter().next();
    if let Some(block) = child_locals_block {
        for (name, expr, _) in &block.body.attributes {
            let node = vg.add_vertex(VariableVertex::new(VertexKind::Local, name.clone(), Some(expr.clone()), ConfigId::Child));
            vg.locals.insert((ConfigId::Child, name.clone()), node);
        }
    }

    if let Some(include_block) = selected_include {
        if let Some(path_expr) = include_block.body.attr("path") {
            let node = vg.add_vertex(VariableVertex::new(VertexKind::Include, "", Some(path_expr.clone()), ConfigId::Child));
            vg.include = Some(node);
        }
    }

    // Wire edges for every child vertex's expression.
    let child_vertex_nodes: Vec<NodeIndex> = vg
        .locals
        .iter()
        .filter(|((owner, _), _)| *owner == ConfigId::Child)
        .map(|(_, n)| *n)
        .chain(vg.include)
        .collect();

    for node in child_vertex_nodes {
        wire_edges(&mut vg, node, ConfigId::Child, &mut diags);
    }
    for node in vg.graph.node_indices().collect::<Vec<_>>() {
        if node == vg.root {
            continue;
        }
        vg.edge_for_root_if_needed(node);
    }

    if is_cyclic_directed(&vg.graph) {
        diags.push(Diagnostic::error(child.path.clone(), 0, 0, CfgError::DependencyCycle { path: child.path.display().to_string() }));
        return Err(diags);
    }

    if let Some(include_node) = vg.include {
        if global_reaches(&vg.graph, include_node) {
            diags.push(Diagnostic::error(child.path.clone(), 0, 0, CfgError::GlobalInIncludePath));
            return Err(diags);
        }
    }

    let mut child_local_values: Vec<(String, Value)> = Vec::new();
    let mut global_values: Vec<(String, Value)> = Vec::new();
    let mut parent_local_values: Vec<(String, Value)> = Vec::new();
    let mut include_value: Option<Value> = None;
    let mut parent_path: Option<PathBuf> = None;

    let order = topo_walk(&vg.graph, vg.root);
    evaluate_order(
        &mut vg,
        &order,
        child,
        functions.clone(),
        false,
        &mut child_local_values,
        &mut parent_local_values,
        &mut global_values,
        &mut include_value,
        &mut parent_path,
        &mut diags,
    );

    if !diags.is_empty() && diags.has_errors() {
        return Err(diags);
    }

    // ─── Phase 2: parent ─────────────────────────────────────────────
    if let (Some(parent_file), Some(_)) = (parent, &include_value) {
        let parent_locals_block = parent_file.top_level_blocks("locals").into_iter().next();
        if let Some(block) = parent_locals_block {
            for (name, expr, _) in &block.body.attributes {
                let node = vg.add_vertex(VariableVertex::new(VertexKind::Local, name.clone(), Some(expr.clone()), ConfigId::Parent));
                vg.locals.insert((ConfigId::Parent, name.clone()), node);
            }
        }

        let parent_globals_block = parent_file.top_level_blocks("globals").into_iter().next();
        if let Some(block) = parent_globals_block {
            for (name, expr, _) in &block.body.attributes {
                if let Some(existing) = vg.globals.get(name).copied() {
                    let v = &mut vg.graph[existing];
                    v.expr = Some(expr.clone());
                    v.owner = ConfigId::Parent;
                } else {
                    let node = vg.add_vertex(VariableVertex::new(VertexKind::Global, name.clone(), Some(expr.clone()), ConfigId::Parent));
                    vg.globals.insert(name.clone(), node);
                }
            }
        }

        let parent_vertex_nodes: Vec<NodeIndex> = vg
            .locals
            .iter()
            .filter(|((owner, _), _)| *owner == ConfigId::Parent)
            .map(|(_, n)| *n)
            .chain(vg.globals.values().copied())
            .collect();
        for node in parent_vertex_nodes {
            wire_edges(&mut vg, node, ConfigId::Parent, &mut diags);
        }
        for node in vg.graph.node_indices().collect::<Vec<_>>() {
            if node == vg.root {
                continue;
            }
            vg.edge_for_root_if_needed(node);
        }

        if is_cyclic_directed(&vg.graph) {
            diags.push(Diagnostic::error(
                parent_file.path.clone(),
                0,
                0,
                CfgError::DependencyCycle { path: parent_file.path.display().to_string() },
            ));
            return Err(diags);
        }

        let order = topo_walk(&vg.graph, vg.root);
        evaluate_order(
            &mut vg,
            &order,
            parent_file,
            functions,
            true,
            &mut child_local_values,
            &mut parent_local_values,
            &mut global_values,
            &mut include_value,
            &mut parent_path,
            &mut diags,
        );
    }

    // Any global still without an expression was never bound by a parent
    // (no include resolved one, or the parent's `globals` block omits it).
    // Checked unconditionally, not just when a parent was found, so a
    // dangling `global.x` reference with no include at all is still caught
    // rather than silently dropping the dependent local's value.
    for (name, node) in vg.globals.clone() {
        if vg.graph[node].expr.is_none() {
            diags.push(Diagnostic::error(child.path.clone(), 0, 0, CfgError::UnboundGlobal { name }));
        }
    }

    if diags.has_errors() {
        return Err(diags);
    }

    Ok(GraphResult {
        child_locals: child_local_values,
        parent_locals: parent_local_values,
        globals: global_values,
        include_value,
        parent_path,
    })
}

fn wire_edges(vg: &mut VariableGraph, node: NodeIndex, owner: ConfigId, diags: &mut Diagnostics) {
    let expr = vg.graph[node].expr.clone();
    let Some(expr) = expr else { return };
    for traversal in expr.variables() {
        match traversal.root.as_str() {
            "local" => {
                let Some(name) = traversal.first_attr() else { continue };
                if let Some(&dep) = vg.locals.get(&(owner, name.to_string())) {
                    vg.graph.add_edge(dep, node, ());
                } else {
                    diags.push(Diagnostic::error(
                        PathBuf::new(),
                        0,
                        0,
                        CfgError::UnresolvedLocal { name: name.to_string() },
                    ));
                }
            }
            "global" => {
                let Some(name) = traversal.first_attr() else { continue };
                let dep = *vg.globals.entry(name.to_string()).or_insert_with(|| {
                    vg.graph.add_node(VariableVertex::new(VertexKind::Global, name.to_string(), None, ConfigId::Parent))
                });
                vg.graph.add_edge(dep, node, ());
            }
            "include" => {
                if let Some(inc) = vg.include {
                    vg.graph.add_edge(inc, node, ());
                }
            }
            "each" | "count" | "dependency" | "feature" | "var" => {
                // Resolved at expression-evaluation time from the ambient
                // `EvalContext`, not from the variable graph.
            }
            other => {
                diags.push(Diagnostic::error(PathBuf::new(), 0, 0, CfgError::UnknownVariableRoot { root: other.to_string() }));
            }
        }
    }
}

/// A vertex is ready to evaluate only once every vertex with an edge into it
/// has already been evaluated (the root counts as trivially satisfied). A
/// child local whose expression reads a not-yet-bound parent global must
/// wait, not be evaluated early against an empty `global` object.
fn is_ready(vg: &VariableGraph, node: NodeIndex) -> bool {
    vg.graph.edges_directed(node, Direction::Incoming).all(|e| e.source() == vg.root || vg.graph[e.source()].evaluated)
}

fn global_reaches(graph: &DiGraph<VariableVertex, ()>, include_node: NodeIndex) -> bool {
    use petgraph::algo::has_path_connecting;
    graph
        .node_indices()
        .filter(|n| graph[*n].kind == VertexKind::Global)
        .any(|g| has_path_connecting(graph, g, include_node, None))
}

#[allow(clippy::too_many_arguments)]
fn evaluate_order(
    vg: &mut VariableGraph,
    order: &[NodeIndex],
    file: &File,
    functions: Arc<FunctionLibrary>,
    evaluate_globals: bool,
    child_locals: &mut Vec<(String, Value)>,
    parent_locals: &mut Vec<(String, Value)>,
    globals: &mut Vec<(String, Value)>,
    include_value: &mut Option<Value>,
    parent_path: &mut Option<PathBuf>,
    diags: &mut Diagnostics,
) {
    for &node in order {
        if node == vg.root {
            continue;
        }
        if vg.graph[node].evaluated {
            continue;
        }
        let kind = vg.graph[node].kind;
        if kind == VertexKind::Global && !evaluate_globals {
            continue;
        }
        if !is_ready(vg, node) {
            continue;
        }
        let Some(expr) = vg.graph[node].expr.clone() else { continue };
        let owner = vg.graph[node].owner;

        let mut ctx = EvalContext::new(functions.clone(), file.path.clone());
        let local_scope = if owner == ConfigId::Child { child_locals.clone() } else { parent_locals.clone() };
        ctx = ctx.with_variable("local", Value::Object(local_scope));
        ctx = ctx.with_variable("global", Value::Object(globals.clone()));
        if let Some(v) = include_value.clone() {
            ctx = ctx.with_variable("include", v);
        }

        match expr.evaluate(&ctx) {
            Ok(value) => {
                let name = vg.graph[node].name.clone();
                match kind {
                    VertexKind::Local if owner == ConfigId::Child => child_locals.push((name, value)),
                    VertexKind::Local => parent_locals.push((name, value)),
                    VertexKind::Global => globals.push((name, value)),
                    VertexKind::Include => {
                        if let Some(path_str) = value.as_str() {
                            let child_dir = file.path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
                            let resolved = normalize(&child_dir.join(path_str));
                            let parent_dir = resolved.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
                            *include_value = Some(Value::Object(vec![
                                ("parent".to_string(), Value::String(parent_dir.display().to_string())),
                                ("relative".to_string(), Value::String(relative(&child_dir, &parent_dir))),
                            ]));
                            *parent_path = Some(resolved);
                        }
                    }
                    VertexKind::Root => {}
                }
                vg.graph[node].evaluated = true;
            }
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), 0, 0, e)),
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn relative(from: &Path, to: &Path) -> String {
    let from_c: Vec<_> = from.components().collect();
    let to_c: Vec<_> = to.components().collect();
    let common = from_c.iter().zip(to_c.iter()).take_while(|(a, b)| a == b).count();
    let mut out = PathBuf::new();
    for _ in common..from_c.len() {
        out.push("..");
    }
    for c in &to_c[common..] {
        out.push(c.as_os_str());
    }
    if out.as_os_str().is_empty() {
        ".".to_string()
    } else {
        out.display().to_string()
    }
}
