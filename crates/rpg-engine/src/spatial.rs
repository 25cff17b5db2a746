//! Spatial index — quadtree per dungeon level.
//!
//! Range, radius and nearest-K queries over mutable object positions.
//!
//! ## Key concepts
//!
//! - One quadtree root per level; all share the world bounds.
//! - Leaf nodes hold up to `NODE_CAPACITY` entries, then subdivide.
//! - Removal collapses subtrees back below capacity, so an insert followed
//!   by a remove restores the exact prior tree.
//! - All operations take a single lock on the index: writers the write
//!   lock, readers the read lock.

use std::collections::{BTreeMap, BinaryHeap, HashMap};

use parking_lot::RwLock;
use rpg_types::ids::EntityId;
use rpg_types::position::{Position, Rect};

use crate::error::GameError;

/// Max entries per leaf before it subdivides.
pub const NODE_CAPACITY: usize = 8;

/// One indexed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialEntry {
    pub id: EntityId,
    pub position: Position,
}

// =============================================================================
// Node
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Node {
    bounds: Rect,
    /// Entries stored at this node. Non-empty only in leaves; keyed by id
    /// so tree contents are order-independent.
    entries: BTreeMap<EntityId, Position>,
    children: Option<Box<[Node; 4]>>,
}

impl Node {
    fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            entries: BTreeMap::new(),
            children: None,
        }
    }

    /// Whether this node's area can be split into four quadrants.
    fn splittable(&self) -> bool {
        self.bounds.width() > 1 && self.bounds.height() > 1
    }

    fn quadrants(&self) -> [Rect; 4] {
        let b = &self.bounds;
        let mid_x = (b.min_x + b.max_x).div_euclid(2);
        let mid_y = (b.min_y + b.max_y).div_euclid(2);
        [
            Rect::new(b.min_x, b.min_y, mid_x, mid_y),
            Rect::new(mid_x + 1, b.min_y, b.max_x, mid_y),
            Rect::new(b.min_x, mid_y + 1, mid_x, b.max_y),
            Rect::new(mid_x + 1, mid_y + 1, b.max_x, b.max_y),
        ]
    }

    fn insert(&mut self, id: EntityId, pos: Position) {
        if let Some(children) = self.children.as_mut() {
            for child in children.iter_mut() {
                if child.bounds.contains(pos.x, pos.y) {
                    child.insert(id, pos);
                    return;
                }
            }
            // Bounds were validated at the root; unreachable in practice.
            debug_assert!(false, "position {pos} escaped all quadrants");
            return;
        }

        self.entries.insert(id, pos);
        if self.entries.len() > NODE_CAPACITY && self.splittable() {
            self.subdivide();
        }
    }

    fn subdivide(&mut self) {
        let quads = self.quadrants();
        let mut children = Box::new([
            Node::new(quads[0]),
            Node::new(quads[1]),
            Node::new(quads[2]),
            Node::new(quads[3]),
        ]);
        for (id, pos) in std::mem::take(&mut self.entries) {
            for child in children.iter_mut() {
                if child.bounds.contains(pos.x, pos.y) {
                    child.insert(id.clone(), pos);
                    break;
                }
            }
        }
        self.children = Some(children);
    }

    /// Remove `id` at known position `pos`. Returns true if removed.
    fn remove(&mut self, id: &EntityId, pos: Position) -> bool {
        let removed = match self.children.as_mut() {
            Some(children) => {
                let mut removed = false;
                for child in children.iter_mut() {
                    if child.bounds.contains(pos.x, pos.y) {
                        removed = child.remove(id, pos);
                        break;
                    }
                }
                removed
            }
            None => self.entries.remove(id).is_some(),
        };
        if removed {
            self.try_collapse();
        }
        removed
    }

    /// Merge children back into this node when the subtree fits in a leaf.
    fn try_collapse(&mut self) {
        let Some(children) = self.children.as_ref() else {
            return;
        };
        if children.iter().any(|c| c.children.is_some()) {
            return;
        }
        let total: usize = children.iter().map(|c| c.entries.len()).sum();
        if total > NODE_CAPACITY {
            return;
        }
        let children = self.children.take().expect("checked above");
        for child in children.into_iter() {
            self.entries.extend(child.entries);
        }
    }

    fn query_range(&self, rect: &Rect, out: &mut Vec<SpatialEntry>) {
        if !self.bounds.intersects(rect) {
            return;
        }
        for (id, pos) in &self.entries {
            if rect.contains(pos.x, pos.y) {
                out.push(SpatialEntry {
                    id: id.clone(),
                    position: *pos,
                });
            }
        }
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                child.query_range(rect, out);
            }
        }
    }

    fn count(&self) -> usize {
        self.entries.len()
            + self
                .children
                .as_ref()
                .map_or(0, |c| c.iter().map(Node::count).sum())
    }

    /// Best-first nearest-K: prune subtrees farther than the current
    /// k-th best candidate.
    fn nearest_into(&self, cx: i32, cy: i32, k: usize, heap: &mut BinaryHeap<Candidate>) {
        if heap.len() == k {
            let worst = heap.peek().expect("heap non-empty").dist_sq;
            if dist_sq_to_rect(&self.bounds, cx, cy) > worst {
                return;
            }
        }
        for (id, pos) in &self.entries {
            let d = dist_sq(cx, cy, pos.x, pos.y);
            heap.push(Candidate {
                dist_sq: d,
                id: id.clone(),
                position: *pos,
            });
            if heap.len() > k {
                heap.pop();
            }
        }
        if let Some(children) = self.children.as_ref() {
            // Visit nearest quadrants first so pruning bites early.
            let mut order: Vec<&Node> = children.iter().collect();
            order.sort_by_key(|c| dist_sq_to_rect(&c.bounds, cx, cy));
            for child in order {
                child.nearest_into(cx, cy, k, heap);
            }
        }
    }
}

/// Nearest-K candidate; the heap is a max-heap on distance so the root is
/// the current worst of the best k.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    dist_sq: i64,
    id: EntityId,
    position: Position,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist_sq
            .cmp(&other.dist_sq)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn dist_sq(ax: i32, ay: i32, bx: i32, by: i32) -> i64 {
    let dx = (ax - bx) as i64;
    let dy = (ay - by) as i64;
    dx * dx + dy * dy
}

fn dist_sq_to_rect(r: &Rect, x: i32, y: i32) -> i64 {
    let dx = if x < r.min_x {
        (r.min_x - x) as i64
    } else if x > r.max_x {
        (x - r.max_x) as i64
    } else {
        0
    };
    let dy = if y < r.min_y {
        (r.min_y - y) as i64
    } else if y > r.max_y {
        (y - r.max_y) as i64
    } else {
        0
    };
    dx * dx + dy * dy
}

// =============================================================================
// SpatialIndex
// =============================================================================

#[derive(Debug, PartialEq)]
struct Levels {
    width: i32,
    height: i32,
    /// Level → quadtree root. Roots are created lazily and dropped when
    /// their last entry is removed.
    roots: BTreeMap<i32, Node>,
    /// Id → last indexed position, for O(1) remove/update.
    positions: HashMap<EntityId, Position>,
}

/// The spatial index. Shared between the world and read-only query
/// handlers; interior lock, clone-free reads via snapshot vectors.
#[derive(Debug)]
pub struct SpatialIndex {
    inner: RwLock<Levels>,
}

impl SpatialIndex {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            inner: RwLock::new(Levels {
                width,
                height,
                roots: BTreeMap::new(),
                positions: HashMap::new(),
            }),
        }
    }

    /// Index an object. Replaces any previous position for the same id.
    /// Fails with `OutOfBounds` when the position lies outside
    /// `[0, W) × [0, H)`.
    pub fn insert(&self, id: EntityId, pos: Position) -> Result<(), GameError> {
        let mut inner = self.inner.write();
        if !Rect::world(inner.width, inner.height).contains(pos.x, pos.y) {
            return Err(GameError::OutOfBounds { position: pos });
        }
        if let Some(old) = inner.positions.remove(&id) {
            remove_from_roots(&mut inner, &id, old);
        }
        inner.positions.insert(id.clone(), pos);
        let world = Rect::world(inner.width, inner.height);
        inner
            .roots
            .entry(pos.level)
            .or_insert_with(|| Node::new(world))
            .insert(id, pos);
        Ok(())
    }

    /// Remove an object. Idempotent: unknown ids are a no-op.
    pub fn remove(&self, id: &EntityId) {
        let mut inner = self.inner.write();
        if let Some(pos) = inner.positions.remove(id) {
            remove_from_roots(&mut inner, id, pos);
        }
    }

    /// Move an object. Equivalent to remove + insert; validates bounds
    /// before touching the tree.
    pub fn update(&self, id: &EntityId, new_pos: Position) -> Result<(), GameError> {
        {
            let inner = self.inner.read();
            if !Rect::world(inner.width, inner.height).contains(new_pos.x, new_pos.y) {
                return Err(GameError::OutOfBounds { position: new_pos });
            }
        }
        self.insert(id.clone(), new_pos)
    }

    /// Last indexed position of an object.
    pub fn position_of(&self, id: &EntityId) -> Option<Position> {
        self.inner.read().positions.get(id).copied()
    }

    /// All objects inside `rect` on `level`.
    pub fn query_range(&self, level: i32, rect: Rect) -> Vec<SpatialEntry> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        if let Some(root) = inner.roots.get(&level) {
            root.query_range(&rect, &mut out);
        }
        out
    }

    /// All objects within Euclidean distance `radius` of `center`, on
    /// `center`'s level.
    pub fn query_radius(&self, center: Position, radius: f64) -> Vec<SpatialEntry> {
        if radius < 0.0 {
            return Vec::new();
        }
        let bbox = Rect::around(center.x, center.y, radius.ceil() as i32);
        let r_sq = radius * radius;
        self.query_range(center.level, bbox)
            .into_iter()
            .filter(|e| {
                dist_sq(center.x, center.y, e.position.x, e.position.y) as f64 <= r_sq
            })
            .collect()
    }

    /// Up to `k` objects nearest to `center` on its level, sorted by
    /// ascending distance.
    pub fn query_nearest_k(&self, center: Position, k: usize) -> Vec<SpatialEntry> {
        if k == 0 {
            return Vec::new();
        }
        let inner = self.inner.read();
        let Some(root) = inner.roots.get(&center.level) else {
            return Vec::new();
        };
        let mut heap = BinaryHeap::with_capacity(k + 1);
        root.nearest_into(center.x, center.y, k, &mut heap);
        heap.into_sorted_vec()
            .into_iter()
            .map(|c| SpatialEntry {
                id: c.id,
                position: c.position,
            })
            .collect()
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.inner.read().positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry (used when loading a fresh snapshot).
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.roots.clear();
        inner.positions.clear();
    }
}

fn remove_from_roots(inner: &mut Levels, id: &EntityId, pos: Position) {
    if let Some(root) = inner.roots.get_mut(&pos.level) {
        root.remove(id, pos);
        if root.count() == 0 {
            inner.roots.remove(&pos.level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rpg_types::rng::RngState;

    fn id(n: usize) -> EntityId {
        EntityId::from(format!("obj_{n}"))
    }

    fn index() -> SpatialIndex {
        SpatialIndex::new(100, 100)
    }

    #[test]
    fn insert_out_of_bounds_fails() {
        let idx = index();
        let err = idx.insert(id(0), Position::new(100, 50, 0)).unwrap_err();
        assert_eq!(err.kind(), "OutOfBounds");
        assert!(idx
            .insert(id(0), Position::new(-1, 0, 0))
            .is_err());
        assert_eq!(idx.len(), 0);
    }

    #[test]
    fn remove_is_idempotent() {
        let idx = index();
        idx.insert(id(0), Position::new(5, 5, 0)).unwrap();
        idx.remove(&id(0));
        idx.remove(&id(0));
        assert_eq!(idx.len(), 0);
    }

    #[test]
    fn insert_then_remove_restores_prior_tree() {
        let idx = index();
        let mut rng = RngState::new(2024);
        // Enough objects to force several subdivisions.
        for n in 0..40 {
            let p = Position::new(rng.next_below(100) as i32, rng.next_below(100) as i32, 0);
            idx.insert(id(n), p).unwrap();
        }
        let before = idx.inner.read().roots.clone();

        let extra = EntityId::from("extra");
        idx.insert(extra.clone(), Position::new(50, 50, 0)).unwrap();
        idx.remove(&extra);

        let after = idx.inner.read().roots.clone();
        assert_eq!(before, after);
    }

    #[test]
    fn update_moves_between_levels() {
        let idx = index();
        idx.insert(id(0), Position::new(5, 5, 0)).unwrap();
        idx.update(&id(0), Position::new(7, 7, 2)).unwrap();
        assert_eq!(idx.position_of(&id(0)), Some(Position::new(7, 7, 2)));
        assert!(idx.query_range(0, Rect::world(100, 100)).is_empty());
        assert_eq!(idx.query_range(2, Rect::world(100, 100)).len(), 1);
    }

    #[test]
    fn update_out_of_bounds_leaves_index_untouched() {
        let idx = index();
        idx.insert(id(0), Position::new(5, 5, 0)).unwrap();
        assert!(idx.update(&id(0), Position::new(100, 5, 0)).is_err());
        assert_eq!(idx.position_of(&id(0)), Some(Position::new(5, 5, 0)));
    }

    #[test]
    fn query_range_prunes_but_finds_all() {
        let idx = index();
        let mut rng = RngState::new(7);
        let mut expected = Vec::new();
        let rect = Rect::new(20, 20, 40, 40);
        for n in 0..200 {
            let p = Position::new(rng.next_below(100) as i32, rng.next_below(100) as i32, 0);
            idx.insert(id(n), p).unwrap();
            if rect.contains(p.x, p.y) {
                expected.push(id(n));
            }
        }
        let mut got: Vec<_> = idx
            .query_range(0, rect)
            .into_iter()
            .map(|e| e.id)
            .collect();
        got.sort();
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn query_radius_is_euclidean() {
        let idx = index();
        // Corner of the bounding box: inside the box, outside the circle.
        idx.insert(id(0), Position::new(57, 57, 0)).unwrap();
        // On the rim.
        idx.insert(id(1), Position::new(60, 50, 0)).unwrap();
        // Inside.
        idx.insert(id(2), Position::new(52, 49, 0)).unwrap();
        let center = Position::new(50, 50, 0);
        let mut got: Vec<_> = idx
            .query_radius(center, 10.0)
            .into_iter()
            .map(|e| e.id)
            .collect();
        got.sort();
        assert_eq!(got, vec![id(1), id(2)]);
    }

    #[test]
    fn nearest_k_sorted_by_distance() {
        let idx = index();
        for (n, (x, y)) in [(50, 50), (51, 50), (60, 60), (10, 10), (52, 52)]
            .into_iter()
            .enumerate()
        {
            idx.insert(id(n), Position::new(x, y, 0)).unwrap();
        }
        let got = idx.query_nearest_k(Position::new(50, 50, 0), 3);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].id, id(0)); // distance 0
        assert_eq!(got[1].id, id(1)); // distance 1
        assert_eq!(got[2].id, id(4)); // distance √8
    }

    #[test]
    fn nearest_k_with_fewer_objects_returns_all() {
        let idx = index();
        idx.insert(id(0), Position::new(1, 1, 0)).unwrap();
        assert_eq!(idx.query_nearest_k(Position::new(50, 50, 0), 5).len(), 1);
        assert!(idx.query_nearest_k(Position::new(50, 50, 0), 0).is_empty());
    }

    proptest! {
        #[test]
        fn range_query_matches_brute_force(
            points in prop::collection::vec((0..100i32, 0..100i32), 1..120),
            (rx0, ry0, rx1, ry1) in (0..100i32, 0..100i32, 0..100i32, 0..100i32),
        ) {
            let idx = index();
            // Last write wins for duplicate coordinates; ids are unique.
            for (n, (x, y)) in points.iter().enumerate() {
                idx.insert(id(n), Position::new(*x, *y, 0)).unwrap();
            }
            let rect = Rect::new(rx0.min(rx1), ry0.min(ry1), rx0.max(rx1), ry0.max(ry1));
            let mut got: Vec<_> = idx.query_range(0, rect).into_iter().map(|e| e.id).collect();
            got.sort();
            let mut expected: Vec<_> = points
                .iter()
                .enumerate()
                .filter(|(_, (x, y))| rect.contains(*x, *y))
                .map(|(n, _)| id(n))
                .collect();
            expected.sort();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn nearest_k_matches_brute_force(
            points in prop::collection::vec((0..60i32, 0..60i32), 1..80),
            k in 1usize..10,
        ) {
            let idx = index();
            for (n, (x, y)) in points.iter().enumerate() {
                idx.insert(id(n), Position::new(*x, *y, 0)).unwrap();
            }
            let center = Position::new(30, 30, 0);
            let got: Vec<i64> = idx
                .query_nearest_k(center, k)
                .into_iter()
                .map(|e| dist_sq(30, 30, e.position.x, e.position.y))
                .collect();
            let mut expected: Vec<i64> = points
                .iter()
                .map(|(x, y)| dist_sq(30, 30, *x, *y))
                .collect();
            expected.sort_unstable();
            expected.truncate(k);
            prop_assert_eq!(got, expected);
        }
    }
}
