//! Directed graph of linked filters owned by a ticker
//!
//! Links are grouped into named pipelines. Pipelines are dismantled in the
//! order they were built, and the links inside one pipeline in reverse, so a
//! consumer is always cut from its producer before the producer is cut from
//! anything upstream.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::block::MediaBlock;
use crate::error::{MediaError, MediaResult};
use crate::filter::{FilterHandle, FilterId, FilterIo, TickContext};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Connection from an output port to an input port
#[derive(Debug)]
pub struct Edge {
    pub from: FilterId,
    pub from_port: usize,
    pub to: FilterId,
    pub to_port: usize,
    queue: VecDeque<MediaBlock>,
}

impl Edge {
    /// Blocks waiting to be consumed
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

#[derive(Debug)]
struct Pipeline {
    name: String,
    edges: Vec<Edge>,
}

/// Outcome of running one tick over the graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub processed: usize,
    pub errors: usize,
}

#[derive(Debug, Default)]
pub struct MediaGraph {
    nodes: HashMap<FilterId, FilterHandle>,
    pipelines: Vec<Pipeline>,
}

impl MediaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.pipelines.iter().flat_map(|p| p.edges.iter())
    }

    fn port_taken(&self, pending: &[Edge], from: Option<(FilterId, usize)>, to: Option<(FilterId, usize)>) -> bool {
        self.edges().chain(pending.iter()).any(|e| {
            from == Some((e.from, e.from_port)) || to == Some((e.to, e.to_port))
        })
    }

    /// Link a chain of filters, output port 0 to input port 0 for each
    /// consecutive pair
    ///
    /// Either every link of the chain is made or none is.
    pub fn link_pipeline(&mut self, name: &str, chain: &[&FilterHandle]) -> MediaResult<()> {
        if chain.len() < 2 {
            return Err(MediaError::Link(format!(
                "pipeline {} needs at least two filters",
                name
            )));
        }
        if self.pipelines.iter().any(|p| p.name == name) {
            return Err(MediaError::Link(format!("pipeline {} already exists", name)));
        }

        let mut edges: Vec<Edge> = Vec::with_capacity(chain.len() - 1);
        let mut result = Ok(());

        for pair in chain.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if let Err(e) = self.check_link(&edges, from, to) {
                result = Err(e);
                break;
            }
            if let Err(e) = from.mark_linked() {
                result = Err(e);
                break;
            }
            if let Err(e) = to.mark_linked() {
                if let Err(unlink) = from.mark_unlinked() {
                    warn!(filter = %from.label(), error = %unlink, "Link rollback could not unlink");
                }
                result = Err(e);
                break;
            }
            edges.push(Edge {
                from: from.id(),
                from_port: 0,
                to: to.id(),
                to_port: 0,
                queue: VecDeque::new(),
            });
        }

        if let Err(e) = result {
            let handles: HashMap<FilterId, &FilterHandle> =
                chain.iter().map(|h| (h.id(), *h)).collect();
            for edge in edges.iter().rev() {
                for id in [edge.to, edge.from] {
                    if let Some(handle) = handles.get(&id) {
                        if let Err(unlink) = handle.mark_unlinked() {
                            warn!(pipeline = name, filter = %handle.label(), error = %unlink, "Link rollback could not unlink");
                        }
                    }
                }
            }
            return Err(e);
        }

        for handle in chain {
            self.nodes.insert(handle.id(), (*handle).clone());
        }
        debug!(
            pipeline = name,
            links = edges.len(),
            chain = %chain.iter().map(|h| h.label()).collect::<Vec<_>>().join(" -> "),
            "Pipeline linked"
        );
        self.pipelines.push(Pipeline {
            name: name.to_string(),
            edges,
        });
        Ok(())
    }

    fn check_link(&self, pending: &[Edge], from: &FilterHandle, to: &FilterHandle) -> MediaResult<()> {
        if from.id() == to.id() {
            return Err(MediaError::Link(format!("{} linked to itself", from.label())));
        }
        if from.kind().output_count() == 0 {
            return Err(MediaError::Link(format!("{} has no output port", from.label())));
        }
        if to.kind().input_count() == 0 {
            return Err(MediaError::Link(format!("{} has no input port", to.label())));
        }
        if self.port_taken(pending, Some((from.id(), 0)), None) {
            return Err(MediaError::Link(format!(
                "output 0 of {} is already linked",
                from.label()
            )));
        }
        if self.port_taken(pending, None, Some((to.id(), 0))) {
            return Err(MediaError::Link(format!(
                "input 0 of {} is already linked",
                to.label()
            )));
        }
        Ok(())
    }

    fn unlink_edge(&self, edge: &Edge) -> MediaResult<()> {
        for id in [edge.to, edge.from] {
            if let Some(handle) = self.nodes.get(&id) {
                handle.mark_unlinked()?;
            }
        }
        Ok(())
    }

    fn forget_unlinked_nodes(&mut self) {
        self.nodes.retain(|_, handle| handle.link_count() > 0);
    }

    /// Unlink one pipeline, its links in reverse order
    pub fn unlink_pipeline(&mut self, name: &str) -> MediaResult<usize> {
        let index = self
            .pipelines
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| MediaError::Link(format!("no pipeline named {}", name)))?;

        let attached = self.pipelines[index]
            .edges
            .iter()
            .flat_map(|e| [e.from, e.to])
            .filter_map(|id| self.nodes.get(&id))
            .find(|h| h.is_attached());
        if let Some(handle) = attached {
            return Err(MediaError::LifecycleViolation {
                filter: handle.label(),
                reason: format!("pipeline {} unlinked while attached", name),
            });
        }

        let pipeline = self.pipelines.remove(index);
        let count = pipeline.edges.len();
        for edge in pipeline.edges.iter().rev() {
            self.unlink_edge(edge)?;
        }
        self.forget_unlinked_nodes();
        debug!(pipeline = name, links = count, "Pipeline unlinked");
        Ok(count)
    }

    /// Unlink every pipeline in construction order
    pub fn dismantle(&mut self) -> MediaResult<usize> {
        let names: Vec<String> = self.pipelines.iter().map(|p| p.name.clone()).collect();
        let mut total = 0;
        for name in names {
            total += self.unlink_pipeline(&name)?;
        }
        Ok(total)
    }

    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn contains(&self, id: FilterId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: FilterId) -> Option<&FilterHandle> {
        self.nodes.get(&id)
    }

    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Blocks sitting in edge queues
    pub fn queued_blocks(&self) -> usize {
        self.edges().map(Edge::queued).sum()
    }

    /// Filters reachable downstream from `entries`, entries included
    pub fn downstream(&self, entries: &[FilterId]) -> HashSet<FilterId> {
        let mut seen: HashSet<FilterId> = HashSet::new();
        let mut stack: Vec<FilterId> = entries.to_vec();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.edges().filter(|e| e.from == id).map(|e| e.to));
        }
        seen
    }

    /// Filters connected to `id` in either direction, `id` included
    pub fn component(&self, id: FilterId) -> HashSet<FilterId> {
        let mut seen: HashSet<FilterId> = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            for edge in self.edges() {
                if edge.from == current {
                    stack.push(edge.to);
                } else if edge.to == current {
                    stack.push(edge.from);
                }
            }
        }
        seen
    }

    /// Check that the graph driven from `entries` can run
    ///
    /// Every entry must be a linked source filter, and every port of every
    /// filter reachable from the entries must be connected.
    pub fn validate(&self, entries: &[FilterId]) -> MediaResult<()> {
        for id in entries {
            let handle = self.nodes.get(id).ok_or_else(|| {
                MediaError::InvalidGraph(format!("entry {} is not part of the graph", id))
            })?;
            if !handle.kind().is_source() {
                return Err(MediaError::InvalidGraph(format!(
                    "entry {} is not a source filter",
                    handle.label()
                )));
            }
        }

        for id in self.downstream(entries) {
            let Some(handle) = self.nodes.get(&id) else {
                continue;
            };
            let kind = handle.kind();
            for port in 0..kind.input_count() {
                if !self.edges().any(|e| e.to == id && e.to_port == port) {
                    return Err(MediaError::InvalidGraph(format!(
                        "input {} of {} is not connected",
                        port,
                        handle.label()
                    )));
                }
            }
            for port in 0..kind.output_count() {
                if !self.edges().any(|e| e.from == id && e.from_port == port) {
                    return Err(MediaError::InvalidGraph(format!(
                        "output {} of {} is not connected",
                        port,
                        handle.label()
                    )));
                }
            }
        }

        self.schedule(entries).map(|_| ())
    }

    /// Processing order for everything reachable from `entries`
    ///
    /// Producers come before their consumers; fails on a cycle.
    pub fn schedule(&self, entries: &[FilterId]) -> MediaResult<Vec<FilterId>> {
        let reachable = self.downstream(entries);
        let mut indegree: HashMap<FilterId, usize> = reachable.iter().map(|id| (*id, 0)).collect();
        for edge in self.edges() {
            if reachable.contains(&edge.from) && reachable.contains(&edge.to) {
                *indegree.entry(edge.to).or_default() += 1;
            }
        }

        // Entries first, in the order given, so the schedule is stable
        let mut ready: VecDeque<FilterId> = entries
            .iter()
            .copied()
            .filter(|id| indegree.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(reachable.len());
        let mut queued: HashSet<FilterId> = ready.iter().copied().collect();

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for edge in self.edges().filter(|e| e.from == id) {
                if let Some(degree) = indegree.get_mut(&edge.to) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 && queued.insert(edge.to) {
                        ready.push_back(edge.to);
                    }
                }
            }
        }

        if order.len() != reachable.len() {
            return Err(MediaError::InvalidGraph(
                "graph contains a cycle".to_string(),
            ));
        }
        Ok(order)
    }

    /// Run every filter in `order` once, moving blocks along the edges
    ///
    /// A failing filter is logged and skipped; the rest of the tick runs.
    pub fn run_tick(&mut self, order: &[FilterId], tick: TickContext) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        for id in order {
            let Some(handle) = self.nodes.get(id).cloned() else {
                continue;
            };
            let mut io = FilterIo::new(handle.kind(), tick);

            for edge in self.pipelines.iter_mut().flat_map(|p| p.edges.iter_mut()) {
                if edge.to == *id {
                    if let Some(input) = io.inputs.get_mut(edge.to_port) {
                        input.append(&mut edge.queue);
                    }
                }
            }

            if let Err(e) = handle.process(&mut io) {
                outcome.errors += 1;
                warn!(filter = %handle.label(), error = %e, tick = tick.count, "Filter process failed");
            }
            outcome.processed += 1;

            for edge in self.pipelines.iter_mut().flat_map(|p| p.edges.iter_mut()) {
                if edge.to == *id {
                    // Unconsumed input waits for the next tick
                    if let Some(input) = io.inputs.get_mut(edge.to_port) {
                        edge.queue.append(input);
                    }
                }
                if edge.from == *id {
                    if let Some(output) = io.outputs.get_mut(edge.from_port) {
                        edge.queue.append(output);
                    }
                }
            }
        }
        outcome
    }
}
