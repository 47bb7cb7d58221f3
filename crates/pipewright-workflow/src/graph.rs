use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use crate::error::WorkflowError;

/// Dependency graph of a workflow's jobs, built from `needs` edges.
///
/// Node order follows job declaration order, which makes every traversal
/// deterministic.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: job_id -> jobs that need it.
  adjacency: IndexMap<String, Vec<String>>,
  /// Reverse adjacency: job_id -> jobs it needs.
  reverse_adjacency: IndexMap<String, Vec<String>>,
  /// Jobs with no `needs`.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from `(job_id, needs)` pairs in declaration order.
  ///
  /// Edges to jobs that are not part of the iterator are ignored; the locker
  /// rejects those before building the graph.
  pub fn new<'a, I>(jobs: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
  {
    let jobs: Vec<(&str, &[String])> = jobs.into_iter().collect();
    let mut adjacency: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut reverse_adjacency: IndexMap<String, Vec<String>> = IndexMap::new();

    // Initialize all jobs
    for (job_id, _) in &jobs {
      adjacency.entry(job_id.to_string()).or_default();
      reverse_adjacency.entry(job_id.to_string()).or_default();
    }

    for (job_id, needs) in &jobs {
      for upstream in needs.iter() {
        if !adjacency.contains_key(upstream) {
          continue;
        }
        adjacency
          .entry(upstream.clone())
          .or_default()
          .push(job_id.to_string());
        reverse_adjacency
          .entry(job_id.to_string())
          .or_default()
          .push(upstream.clone());
      }
    }

    let entry_points = reverse_adjacency
      .iter()
      .filter(|(_, upstream)| upstream.is_empty())
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      adjacency,
      reverse_adjacency,
      entry_points,
    }
  }

  /// Jobs with no dependencies.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Jobs that need the given job.
  pub fn downstream(&self, job_id: &str) -> &[String] {
    self
      .adjacency
      .get(job_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Jobs the given job needs.
  pub fn upstream(&self, job_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(job_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// A valid run order, or the first cycle found.
  ///
  /// Among jobs that are ready at the same time, declaration order wins.
  pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
    let mut in_degree: IndexMap<&str, usize> = self
      .reverse_adjacency
      .iter()
      .map(|(id, upstream)| (id.as_str(), upstream.len()))
      .collect();

    let mut queue: VecDeque<&str> = self.entry_points.iter().map(String::as_str).collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while let Some(job_id) = queue.pop_front() {
      order.push(job_id.to_string());
      for downstream in self.downstream(job_id) {
        if let Some(degree) = in_degree.get_mut(downstream.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            queue.push_back(downstream.as_str());
          }
        }
      }
    }

    if order.len() == in_degree.len() {
      return Ok(order);
    }

    in_degree.retain(|_, degree| *degree > 0);
    let remaining: IndexSet<&str> = in_degree.keys().copied().collect();
    Err(WorkflowError::CyclicDependency {
      cycle: self.find_cycle(&remaining),
    })
  }

  /// DFS with coloring over the jobs that Kahn's algorithm could not order.
  /// Walks `needs` edges, so `[a, b, a]` reads "a needs b needs a".
  fn find_cycle(&self, remaining: &IndexSet<&str>) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
      White,
      Gray,
      Black,
    }

    fn dfs<'a>(
      graph: &'a Graph,
      job_id: &'a str,
      remaining: &IndexSet<&str>,
      color: &mut IndexMap<&'a str, Color>,
      stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
      color.insert(job_id, Color::Gray);
      stack.push(job_id);

      for upstream in graph.upstream(job_id) {
        let upstream = upstream.as_str();
        if !remaining.contains(upstream) {
          continue;
        }
        match color.get(upstream).copied().unwrap_or(Color::White) {
          Color::Gray => {
            // Back edge: the cycle is the stack from `upstream` onwards
            let start = stack.iter().position(|id| *id == upstream).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|id| id.to_string()).collect();
            cycle.push(upstream.to_string());
            return Some(cycle);
          }
          Color::White => {
            if let Some(cycle) = dfs(graph, upstream, remaining, color, stack) {
              return Some(cycle);
            }
          }
          Color::Black => {}
        }
      }

      stack.pop();
      color.insert(job_id, Color::Black);
      None
    }

    let mut color: IndexMap<&str, Color> = IndexMap::new();
    for (job_id, _) in self.reverse_adjacency.iter() {
      let job_id = job_id.as_str();
      if !remaining.contains(job_id) || color.contains_key(job_id) {
        continue;
      }
      let mut stack = Vec::new();
      if let Some(cycle) = dfs(self, job_id, remaining, &mut color, &mut stack) {
        return cycle;
      }
    }

    // Unreachable for a graph Kahn's algorithm failed on
    remaining.iter().map(|id| id.to_string()).collect()
  }
}
