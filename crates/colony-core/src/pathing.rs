//! A* over controller cost surfaces.
//!
//! Paths stay inside the surface's zone. A goal in another zone is reached
//! by walking to the border edge facing it; standing on that edge, the next
//! step crosses into the neighboring zone. Diagonal zones are reached one
//! axis at a time, the longer axis first.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use colony_logic::cost::CostSurface;
use colony_logic::types::{Pos, ZoneId, ZONE_AREA, ZONE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    North,
    East,
    South,
    West,
}

impl Edge {
    /// The edge to leave `from` by when heading for `to`.
    pub fn toward(from: ZoneId, to: ZoneId) -> Option<Edge> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        if dx == 0 && dy == 0 {
            return None;
        }
        Some(if dx.abs() >= dy.abs() {
            if dx > 0 {
                Edge::East
            } else {
                Edge::West
            }
        } else if dy > 0 {
            Edge::South
        } else {
            Edge::North
        })
    }

    pub fn contains(self, pos: &Pos) -> bool {
        let max = ZONE_SIZE - 1;
        match self {
            Edge::North => pos.y == 0,
            Edge::East => pos.x == max,
            Edge::South => pos.y == max,
            Edge::West => pos.x == 0,
        }
    }

    fn distance(self, pos: &Pos) -> u32 {
        let max = ZONE_SIZE - 1;
        u32::from(match self {
            Edge::North => pos.y,
            Edge::East => max - pos.x,
            Edge::South => max - pos.y,
            Edge::West => pos.x,
        })
    }

    /// The tile on the other side of the edge.
    pub fn cross(self, pos: &Pos) -> Pos {
        let max = ZONE_SIZE - 1;
        let z = pos.zone;
        match self {
            Edge::North => Pos::new(ZoneId::new(z.x, z.y - 1), pos.x, max),
            Edge::East => Pos::new(ZoneId::new(z.x + 1, z.y), 0, pos.y),
            Edge::South => Pos::new(ZoneId::new(z.x, z.y + 1), pos.x, 0),
            Edge::West => Pos::new(ZoneId::new(z.x - 1, z.y), max, pos.y),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Within(Pos, u32),
    Exit(Edge),
}

impl Target {
    fn reached(&self, pos: &Pos) -> bool {
        match self {
            Target::Within(goal, range) => pos.in_range(goal, *range),
            Target::Exit(edge) => edge.contains(pos),
        }
    }

    fn estimate(&self, pos: &Pos) -> u32 {
        match self {
            Target::Within(goal, range) => pos.range_to(goal).saturating_sub(*range),
            Target::Exit(edge) => edge.distance(pos),
        }
    }
}

/// Tiles to walk, start excluded. Empty when already there; `None` when
/// unreachable within the surface's operation budget.
pub fn find_path(surface: &CostSurface, from: Pos, goal: Pos, range: u32) -> Option<Vec<Pos>> {
    let target = match Edge::toward(from.zone, goal.zone) {
        Some(edge) => Target::Exit(edge),
        None => Target::Within(goal, range),
    };
    if target.reached(&from) {
        return Some(Vec::new());
    }

    let mut best = vec![u32::MAX; ZONE_AREA];
    let mut came_from: Vec<Option<usize>> = vec![None; ZONE_AREA];
    let mut open = BinaryHeap::new();
    let start = from.index();
    best[start] = 0;
    open.push(Reverse((target.estimate(&from), 0u32, start)));
    let mut ops = 0u32;

    while let Some(Reverse((_, g, idx))) = open.pop() {
        if g > best[idx] {
            continue;
        }
        let pos = tile(from.zone, idx);
        if target.reached(&pos) {
            return Some(unwind(&came_from, from.zone, start, idx));
        }
        ops += 1;
        if ops > surface.max_ops {
            log::trace!("path {from} -> {goal} gave up after {ops} ops");
            return None;
        }
        for next in pos.neighbors() {
            if surface.matrix.is_blocked(next.x, next.y) && !is_goal_tile(&target, &next) {
                continue;
            }
            let cost = g + u32::from(surface.matrix.get(next.x, next.y).max(1));
            let ni = next.index();
            if cost < best[ni] {
                best[ni] = cost;
                came_from[ni] = Some(idx);
                open.push(Reverse((cost + target.estimate(&next), cost, ni)));
            }
        }
    }
    None
}

/// The next tile to step onto, including a border crossing.
pub fn next_step(surface: &CostSurface, from: Pos, goal: Pos, range: u32) -> Option<Pos> {
    if let Some(edge) = Edge::toward(from.zone, goal.zone) {
        if edge.contains(&from) {
            return Some(edge.cross(&from));
        }
    }
    find_path(surface, from, goal, range)?.first().copied()
}

fn is_goal_tile(target: &Target, pos: &Pos) -> bool {
    matches!(target, Target::Within(goal, 0) if goal == pos)
}

fn tile(zone: ZoneId, idx: usize) -> Pos {
    let size = usize::from(ZONE_SIZE);
    Pos::new(zone, (idx % size) as u8, (idx / size) as u8)
}

fn unwind(came_from: &[Option<usize>], zone: ZoneId, start: usize, end: usize) -> Vec<Pos> {
    let mut path = vec![tile(zone, end)];
    let mut cur = end;
    while let Some(prev) = came_from[cur] {
        if prev == start {
            break;
        }
        path.push(tile(zone, prev));
        cur = prev;
    }
    path.reverse();
    path
}
