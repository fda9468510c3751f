//! A* behavior over whole grids, checked against brute force.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use terrasim::{Cell, PathfinderGraph};

struct Field {
    size: i32,
    walls: Vec<bool>,
    costs: Vec<f32>,
}

impl Field {
    fn random(size: i32, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n = (size * size) as usize;
        let mut walls: Vec<bool> = (0..n).map(|_| rng.gen_bool(0.2)).collect();
        let costs = (0..n).map(|_| rng.gen_range(0.0..5.0)).collect();
        walls[0] = false;
        Self { size, walls, costs }
    }

    fn index(&self, (x, y): Cell) -> usize {
        (y * self.size + x) as usize
    }

    fn graph(&self) -> PathfinderGraph<Field> {
        PathfinderGraph::new(self.size as usize, self.size as usize)
            .with_walkable(|f: &Field, x, y| !f.walls[f.index((x, y))])
            .with_base_cost(|f: &Field, cell| f.costs[f.index(cell)])
    }
}

#[derive(PartialEq)]
struct Entry(f32, Cell);

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.total_cmp(&self.0)
    }
}

/// Cheapest cost from `start` to `goal` by exhaustive Dijkstra.
fn brute_force(
    field: &Field,
    graph: &PathfinderGraph<Field>,
    start: Cell,
    goal: Cell,
) -> Option<f32> {
    let mut best = vec![f32::INFINITY; field.walls.len()];
    let mut open = BinaryHeap::new();
    best[field.index(start)] = 0.0;
    open.push(Entry(0.0, start));
    while let Some(Entry(cost, cell)) = open.pop() {
        if cell == goal {
            return Some(cost);
        }
        if cost > best[field.index(cell)] {
            continue;
        }
        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            let next = (cell.0 + dx, cell.1 + dy);
            if !graph.walkable(field, next.0, next.1) {
                continue;
            }
            let next_cost = cost + graph.transition_cost(field, cell, next);
            if next_cost < best[field.index(next)] {
                best[field.index(next)] = next_cost;
                open.push(Entry(next_cost, next));
            }
        }
    }
    None
}

fn path_cost(field: &Field, graph: &PathfinderGraph<Field>, start: Cell, path: &[Cell]) -> f32 {
    let mut from = start;
    let mut total = 0.0;
    for &to in path {
        total += graph.transition_cost(field, from, to);
        from = to;
    }
    total
}

#[test]
fn test_flat_field_manhattan_path() {
    let mut graph = PathfinderGraph::<()>::new(8, 8);
    let path = graph.pathfind(&(), 0, 0, 7, 7);

    assert_eq!(path.len(), 14);
    assert_eq!(path.last(), Some(&(7, 7)));
    assert!(graph.reached_goal());
    let mut prev = 0;
    for &(x, y) in &path {
        assert_eq!(x + y, prev + 1);
        prev = x + y;
    }
}

#[test]
fn test_matches_exhaustive_search_on_random_fields() {
    for seed in 0..24 {
        let size = 6 + (seed as i32 % 15);
        let field = Field::random(size, seed);
        let mut graph = field.graph();
        let goal = (size - 1, size - 1);
        let expected = brute_force(&field, &graph, (0, 0), goal);

        let path = graph.pathfind(&field, 0, 0, goal.0, goal.1);
        match expected {
            Some(cost) => {
                assert!(graph.reached_goal(), "seed {seed}: goal reachable but not reached");
                assert_eq!(path.last(), Some(&goal));
                let found = path_cost(&field, &graph, (0, 0), &path);
                assert!(found <= cost + 1e-3, "seed {seed}: {found} > {cost}");
            }
            None => assert!(!graph.reached_goal(), "seed {seed}: reached an unreachable goal"),
        }
    }
}

#[test]
fn test_walled_in_start_returns_short_path() {
    // Start at (2,2) boxed in by a ring of walls.
    let mut graph = PathfinderGraph::<()>::new(10, 10).with_walkable(|_, x, y| {
        let ring = (1..=3).contains(&x) && (1..=3).contains(&y) && (x, y) != (2, 2);
        !ring
    });
    let path = graph.pathfind(&(), 2, 2, 9, 9);
    assert!(path.is_empty());
    assert!(!graph.reached_goal());

    // The pooled graph is reusable for the next search.
    let path = graph.pathfind(&(), 5, 5, 9, 9);
    assert_eq!(path.len(), 8);
}

#[test]
fn test_unreachable_goal_ends_near_it() {
    // A full wall on column 5 splits the grid.
    let mut graph = PathfinderGraph::<()>::new(10, 10).with_walkable(|_, x, _| x != 5);
    let path = graph.pathfind(&(), 0, 4, 9, 4);
    assert!(!graph.reached_goal());
    assert!(path.iter().all(|&(x, _)| x < 5));
    assert_eq!(graph.status(), terrasim::SearchStatus::Done);
}

#[test]
fn test_budgeted_search_matches_full_search() {
    let field = Field::random(20, 99);
    let mut full = field.graph();
    let expected = full.pathfind(&field, 0, 0, 19, 19);

    let mut stepped = field.graph();
    stepped.begin(0, 0, 19, 19);
    let mut rounds = 0;
    while stepped.advance(&field, 5) != terrasim::SearchStatus::Done {
        assert!(stepped.take_path().is_empty());
        rounds += 1;
    }
    assert!(rounds > 0);
    assert_eq!(stepped.take_path(), expected);
}
