//! Maximum weight matching on general graphs.
//!
//! Edmonds' blossom algorithm with dual variables, O(n³). Works on integer
//! weights only, so every dual update stays exact. Vertices and edges are
//! processed in index order, which makes the result reproducible for a given
//! edge list.

/// Marker for "no vertex / edge / endpoint / blossom".
const NIL: usize = usize::MAX;

/// Compute a maximum weight matching.
///
/// `edges` lists undirected edges `(a, b, weight)` between distinct vertices
/// below `vertex_count`. With `max_cardinality` set, only matchings of
/// maximum size are considered. Returns each vertex's partner.
pub fn max_weight_matching(
    vertex_count: usize,
    edges: &[(usize, usize, i128)],
    max_cardinality: bool,
) -> Vec<Option<usize>> {
    if edges.is_empty() || vertex_count == 0 {
        return vec![None; vertex_count];
    }
    debug_assert!(
        edges
            .iter()
            .all(|&(a, b, _)| a != b && a < vertex_count && b < vertex_count)
    );

    let mut matcher = Matcher::new(vertex_count, edges);
    matcher.solve(max_cardinality);
    matcher
        .mate
        .iter()
        .map(|&p| (p != NIL).then(|| matcher.endpoint[p]))
        .collect()
}

/// Pairs `(i, partner)` with `i < partner`, in increasing order of `i`, so each
/// matched edge is reported once.
pub fn matched_pairs(mate: &[Option<usize>]) -> Vec<(usize, usize)> {
    mate.iter()
        .enumerate()
        .filter_map(|(i, m)| m.filter(|&j| i < j).map(|j| (i, j)))
        .collect()
}

struct Matcher<'a> {
    n: usize,
    edges: &'a [(usize, usize, i128)],
    /// `endpoint[p]` is the vertex at endpoint `p`; edge `k` owns endpoints `2k` and `2k + 1`.
    endpoint: Vec<usize>,
    /// Remote endpoints of the edges incident to each vertex.
    neighbend: Vec<Vec<usize>>,
    /// Remote endpoint of each vertex's matched edge.
    mate: Vec<usize>,
    /// 0 = free, 1 = S, 2 = T; 5 marks breadcrumbs during `scan_blossom`.
    label: Vec<u8>,
    labelend: Vec<usize>,
    inblossom: Vec<usize>,
    blossomparent: Vec<usize>,
    blossomchilds: Vec<Vec<usize>>,
    blossombase: Vec<usize>,
    blossomendps: Vec<Vec<usize>>,
    bestedge: Vec<usize>,
    blossombestedges: Vec<Option<Vec<usize>>>,
    unusedblossoms: Vec<usize>,
    dualvar: Vec<i128>,
    allowedge: Vec<bool>,
    queue: Vec<usize>,
}

/// Python-style index into a cyclic list: `-1` is the last element.
fn cyclic(list: &[usize], j: isize) -> usize {
    list[j.rem_euclid(list.len() as isize) as usize]
}

impl<'a> Matcher<'a> {
    fn new(n: usize, edges: &'a [(usize, usize, i128)]) -> Self {
        let max_weight = edges.iter().map(|e| e.2).max().unwrap_or(0).max(0);

        let endpoint = (0..2 * edges.len())
            .map(|p| {
                let (a, b, _) = edges[p / 2];
                if p % 2 == 0 { a } else { b }
            })
            .collect();

        let mut neighbend = vec![Vec::new(); n];
        for (k, &(a, b, _)) in edges.iter().enumerate() {
            neighbend[a].push(2 * k + 1);
            neighbend[b].push(2 * k);
        }

        let mut blossombase: Vec<usize> = (0..n).collect();
        blossombase.extend(std::iter::repeat_n(NIL, n));
        let mut dualvar = vec![max_weight; n];
        dualvar.extend(std::iter::repeat_n(0, n));

        Self {
            n,
            edges,
            endpoint,
            neighbend,
            mate: vec![NIL; n],
            label: vec![0; 2 * n],
            labelend: vec![NIL; 2 * n],
            inblossom: (0..n).collect(),
            blossomparent: vec![NIL; 2 * n],
            blossomchilds: vec![Vec::new(); 2 * n],
            blossombase,
            blossomendps: vec![Vec::new(); 2 * n],
            bestedge: vec![NIL; 2 * n],
            blossombestedges: vec![None; 2 * n],
            unusedblossoms: (n..2 * n).collect(),
            dualvar,
            allowedge: vec![false; edges.len()],
            queue: Vec::new(),
        }
    }

    fn slack(&self, k: usize) -> i128 {
        let (a, b, w) = self.edges[k];
        self.dualvar[a] + self.dualvar[b] - 2 * w
    }

    fn blossom_leaves(&self, b: usize) -> Vec<usize> {
        let mut leaves = Vec::new();
        self.collect_leaves(b, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, b: usize, out: &mut Vec<usize>) {
        if b < self.n {
            out.push(b);
        } else {
            for &child in &self.blossomchilds[b] {
                self.collect_leaves(child, out);
            }
        }
    }

    /// Label the top-level blossom containing `w` with `t`, reached through endpoint `p`.
    fn assign_label(&mut self, w: usize, t: u8, p: usize) {
        let b = self.inblossom[w];
        debug_assert!(self.label[w] == 0 && self.label[b] == 0);
        self.label[w] = t;
        self.label[b] = t;
        self.labelend[w] = p;
        self.labelend[b] = p;
        self.bestedge[w] = NIL;
        self.bestedge[b] = NIL;
        if t == 1 {
            let leaves = self.blossom_leaves(b);
            self.queue.extend(leaves);
        } else if t == 2 {
            let base = self.blossombase[b];
            let mate = self.mate[base];
            debug_assert!(mate != NIL);
            self.assign_label(self.endpoint[mate], 1, mate ^ 1);
        }
    }

    /// Trace back from `v` and `w` to find a new blossom's base, or `NIL` when
    /// the two trees are disjoint and an augmenting path exists.
    fn scan_blossom(&mut self, mut v: usize, mut w: usize) -> usize {
        let mut path = Vec::new();
        let mut base = NIL;
        while v != NIL || w != NIL {
            let mut b = self.inblossom[v];
            if self.label[b] & 4 != 0 {
                base = self.blossombase[b];
                break;
            }
            debug_assert_eq!(self.label[b], 1);
            path.push(b);
            self.label[b] = 5;
            if self.labelend[b] == NIL {
                v = NIL;
            } else {
                v = self.endpoint[self.labelend[b]];
                b = self.inblossom[v];
                debug_assert_eq!(self.label[b], 2);
                v = self.endpoint[self.labelend[b]];
            }
            if w != NIL {
                std::mem::swap(&mut v, &mut w);
            }
        }
        for b in path {
            self.label[b] = 1;
        }
        base
    }

    /// Shrink the odd cycle through edge `k` into a new S-blossom with base `base`.
    fn add_blossom(&mut self, base: usize, k: usize) {
        let (mut v, mut w, _) = self.edges[k];
        let bb = self.inblossom[base];
        let mut bv = self.inblossom[v];
        let mut bw = self.inblossom[w];

        let Some(b) = self.unusedblossoms.pop() else {
            unreachable!("blossom count exceeds vertex count");
        };
        self.blossombase[b] = base;
        self.blossomparent[b] = NIL;
        self.blossomparent[bb] = b;

        let mut path = Vec::new();
        let mut endps = Vec::new();
        while bv != bb {
            self.blossomparent[bv] = b;
            path.push(bv);
            endps.push(self.labelend[bv]);
            v = self.endpoint[self.labelend[bv]];
            bv = self.inblossom[v];
        }
        path.push(bb);
        path.reverse();
        endps.reverse();
        endps.push(2 * k);
        while bw != bb {
            self.blossomparent[bw] = b;
            path.push(bw);
            endps.push(self.labelend[bw] ^ 1);
            w = self.endpoint[self.labelend[bw]];
            bw = self.inblossom[w];
        }
        debug_assert_eq!(self.label[bb], 1);
        self.blossomchilds[b] = path.clone();
        self.blossomendps[b] = endps;

        self.label[b] = 1;
        self.labelend[b] = self.labelend[bb];
        self.dualvar[b] = 0;
        for leaf in self.blossom_leaves(b) {
            if self.label[self.inblossom[leaf]] == 2 {
                // Former T-vertices become S-vertices and must be scanned.
                self.queue.push(leaf);
            }
            self.inblossom[leaf] = b;
        }

        let mut bestedgeto = vec![NIL; 2 * self.n];
        for &child in &path {
            let nblists: Vec<Vec<usize>> = match self.blossombestedges[child].take() {
                Some(list) => vec![list],
                None => self
                    .blossom_leaves(child)
                    .into_iter()
                    .map(|leaf| self.neighbend[leaf].iter().map(|p| p / 2).collect())
                    .collect(),
            };
            for nblist in nblists {
                for k in nblist {
                    let (i, j, _) = self.edges[k];
                    let j = if self.inblossom[j] == b { i } else { j };
                    let bj = self.inblossom[j];
                    if bj != b
                        && self.label[bj] == 1
                        && (bestedgeto[bj] == NIL || self.slack(k) < self.slack(bestedgeto[bj]))
                    {
                        bestedgeto[bj] = k;
                    }
                }
            }
            self.bestedge[child] = NIL;
        }

        let best: Vec<usize> = bestedgeto.into_iter().filter(|&k| k != NIL).collect();
        self.bestedge[b] = NIL;
        for &k in &best {
            if self.bestedge[b] == NIL || self.slack(k) < self.slack(self.bestedge[b]) {
                self.bestedge[b] = k;
            }
        }
        self.blossombestedges[b] = Some(best);
    }

    /// Dissolve blossom `b`, relabelling its children when it was a T-blossom
    /// expanded mid-stage.
    fn expand_blossom(&mut self, b: usize, endstage: bool) {
        let children = self.blossomchilds[b].clone();
        for &s in &children {
            self.blossomparent[s] = NIL;
            if s < self.n {
                self.inblossom[s] = s;
            } else if endstage && self.dualvar[s] == 0 {
                self.expand_blossom(s, endstage);
            } else {
                for leaf in self.blossom_leaves(s) {
                    self.inblossom[leaf] = s;
                }
            }
        }

        if !endstage && self.label[b] == 2 {
            let entrychild = self.inblossom[self.endpoint[self.labelend[b] ^ 1]];
            let len = children.len() as isize;
            let mut j = children
                .iter()
                .position(|&c| c == entrychild)
                .map_or(0, |i| i as isize);
            let (jstep, endptrick): (isize, usize) = if j & 1 != 0 {
                j -= len;
                (1, 0)
            } else {
                (-1, 1)
            };

            let mut p = self.labelend[b];
            while j != 0 {
                let back = cyclic(&self.blossomendps[b], j - endptrick as isize);
                self.label[self.endpoint[p ^ 1]] = 0;
                self.label[self.endpoint[back ^ endptrick ^ 1]] = 0;
                self.assign_label(self.endpoint[p ^ 1], 2, p);
                self.allowedge[back / 2] = true;
                j += jstep;
                p = cyclic(&self.blossomendps[b], j - endptrick as isize) ^ endptrick;
                self.allowedge[p / 2] = true;
                j += jstep;
            }

            let bv = cyclic(&children, j);
            let entry = self.endpoint[p ^ 1];
            self.label[entry] = 2;
            self.label[bv] = 2;
            self.labelend[entry] = p;
            self.labelend[bv] = p;
            self.bestedge[bv] = NIL;
            j += jstep;

            while cyclic(&children, j) != entrychild {
                let bv = cyclic(&children, j);
                if self.label[bv] == 1 {
                    j += jstep;
                    continue;
                }
                let reached = self
                    .blossom_leaves(bv)
                    .into_iter()
                    .find(|&leaf| self.label[leaf] != 0);
                if let Some(v) = reached {
                    debug_assert_eq!(self.label[v], 2);
                    self.label[v] = 0;
                    let base_mate = self.mate[self.blossombase[bv]];
                    self.label[self.endpoint[base_mate]] = 0;
                    self.assign_label(v, 2, self.labelend[v]);
                }
                j += jstep;
            }
        }

        self.label[b] = 0;
        self.labelend[b] = NIL;
        self.blossomchilds[b].clear();
        self.blossomendps[b].clear();
        self.blossombase[b] = NIL;
        self.blossombestedges[b] = None;
        self.bestedge[b] = NIL;
        self.unusedblossoms.push(b);
    }

    /// Swap matched and unmatched edges along the even path from `v` to the
    /// base of blossom `b`, then rotate `b` so `v` becomes its base.
    fn augment_blossom(&mut self, b: usize, v: usize) {
        let mut t = v;
        while self.blossomparent[t] != b {
            t = self.blossomparent[t];
        }
        if t >= self.n {
            self.augment_blossom(t, v);
        }

        let len = self.blossomchilds[b].len() as isize;
        let i = self.blossomchilds[b]
            .iter()
            .position(|&c| c == t)
            .unwrap_or(0);
        let mut j = i as isize;
        let (jstep, endptrick): (isize, usize) = if i & 1 != 0 {
            j -= len;
            (1, 0)
        } else {
            (-1, 1)
        };

        while j != 0 {
            j += jstep;
            let t = cyclic(&self.blossomchilds[b], j);
            let p = cyclic(&self.blossomendps[b], j - endptrick as isize) ^ endptrick;
            if t >= self.n {
                self.augment_blossom(t, self.endpoint[p]);
            }
            j += jstep;
            let t = cyclic(&self.blossomchilds[b], j);
            if t >= self.n {
                self.augment_blossom(t, self.endpoint[p ^ 1]);
            }
            self.mate[self.endpoint[p]] = p ^ 1;
            self.mate[self.endpoint[p ^ 1]] = p;
        }

        self.blossomchilds[b].rotate_left(i);
        self.blossomendps[b].rotate_left(i);
        self.blossombase[b] = self.blossombase[self.blossomchilds[b][0]];
        debug_assert_eq!(self.blossombase[b], v);
    }

    /// Augment the matching along the path through edge `k`.
    fn augment_matching(&mut self, k: usize) {
        let (v, w, _) = self.edges[k];
        for (mut s, mut p) in [(v, 2 * k + 1), (w, 2 * k)] {
            loop {
                let bs = self.inblossom[s];
                debug_assert_eq!(self.label[bs], 1);
                if bs >= self.n {
                    self.augment_blossom(bs, s);
                }
                self.mate[s] = p;
                if self.labelend[bs] == NIL {
                    break;
                }
                let t = self.endpoint[self.labelend[bs]];
                let bt = self.inblossom[t];
                debug_assert_eq!(self.label[bt], 2);
                s = self.endpoint[self.labelend[bt]];
                let j = self.endpoint[self.labelend[bt] ^ 1];
                if bt >= self.n {
                    self.augment_blossom(bt, j);
                }
                self.mate[j] = self.labelend[bt];
                p = self.labelend[bt] ^ 1;
            }
        }
    }

    /// Scan queued S-vertices. Returns true once the matching was augmented.
    fn grow_trees(&mut self) -> bool {
        while let Some(v) = self.queue.pop() {
            debug_assert_eq!(self.label[self.inblossom[v]], 1);
            for p in self.neighbend[v].clone() {
                let k = p / 2;
                let w = self.endpoint[p];
                if self.inblossom[v] == self.inblossom[w] {
                    continue;
                }
                let mut kslack = 0;
                if !self.allowedge[k] {
                    kslack = self.slack(k);
                    if kslack <= 0 {
                        self.allowedge[k] = true;
                    }
                }
                if self.allowedge[k] {
                    if self.label[self.inblossom[w]] == 0 {
                        self.assign_label(w, 2, p ^ 1);
                    } else if self.label[self.inblossom[w]] == 1 {
                        let base = self.scan_blossom(v, w);
                        if base != NIL {
                            self.add_blossom(base, k);
                        } else {
                            self.augment_matching(k);
                            return true;
                        }
                    } else if self.label[w] == 0 {
                        debug_assert_eq!(self.label[self.inblossom[w]], 2);
                        self.label[w] = 2;
                        self.labelend[w] = p ^ 1;
                    }
                } else if self.label[self.inblossom[w]] == 1 {
                    let b = self.inblossom[v];
                    if self.bestedge[b] == NIL || kslack < self.slack(self.bestedge[b]) {
                        self.bestedge[b] = k;
                    }
                } else if self.label[w] == 0
                    && (self.bestedge[w] == NIL || kslack < self.slack(self.bestedge[w]))
                {
                    self.bestedge[w] = k;
                }
            }
        }
        false
    }

    fn solve(&mut self, max_cardinality: bool) {
        let n = self.n;
        for _stage in 0..n {
            self.label.fill(0);
            self.bestedge.fill(NIL);
            for b in n..2 * n {
                self.blossombestedges[b] = None;
            }
            self.allowedge.fill(false);
            self.queue.clear();

            for v in 0..n {
                if self.mate[v] == NIL && self.label[self.inblossom[v]] == 0 {
                    self.assign_label(v, 1, NIL);
                }
            }

            let mut augmented = false;
            loop {
                if self.grow_trees() {
                    augmented = true;
                    break;
                }

                let mut delta_kind = Delta::None;
                let mut delta: i128 = 0;

                if !max_cardinality {
                    delta_kind = Delta::VertexDual;
                    delta = self.dualvar[..n].iter().copied().min().unwrap_or(0);
                }

                for v in 0..n {
                    if self.label[self.inblossom[v]] == 0 && self.bestedge[v] != NIL {
                        let d = self.slack(self.bestedge[v]);
                        if delta_kind == Delta::None || d < delta {
                            delta = d;
                            delta_kind = Delta::FreeEdge(self.bestedge[v]);
                        }
                    }
                }

                for b in 0..2 * n {
                    if self.blossomparent[b] == NIL
                        && self.label[b] == 1
                        && self.bestedge[b] != NIL
                    {
                        let kslack = self.slack(self.bestedge[b]);
                        debug_assert_eq!(kslack % 2, 0);
                        let d = kslack / 2;
                        if delta_kind == Delta::None || d < delta {
                            delta = d;
                            delta_kind = Delta::InnerEdge(self.bestedge[b]);
                        }
                    }
                }

                for b in n..2 * n {
                    if self.blossombase[b] != NIL
                        && self.blossomparent[b] == NIL
                        && self.label[b] == 2
                        && (delta_kind == Delta::None || self.dualvar[b] < delta)
                    {
                        delta = self.dualvar[b];
                        delta_kind = Delta::Expand(b);
                    }
                }

                if delta_kind == Delta::None {
                    // No further improvement possible; max cardinality reached.
                    debug_assert!(max_cardinality);
                    delta_kind = Delta::VertexDual;
                    delta = self.dualvar[..n].iter().copied().min().unwrap_or(0).max(0);
                }

                for v in 0..n {
                    match self.label[self.inblossom[v]] {
                        1 => self.dualvar[v] -= delta,
                        2 => self.dualvar[v] += delta,
                        _ => {}
                    }
                }
                for b in n..2 * n {
                    if self.blossombase[b] != NIL && self.blossomparent[b] == NIL {
                        match self.label[b] {
                            1 => self.dualvar[b] += delta,
                            2 => self.dualvar[b] -= delta,
                            _ => {}
                        }
                    }
                }

                match delta_kind {
                    Delta::None | Delta::VertexDual => break,
                    Delta::FreeEdge(k) => {
                        self.allowedge[k] = true;
                        let (i, j, _) = self.edges[k];
                        let s = if self.label[self.inblossom[i]] == 0 { j } else { i };
                        debug_assert_eq!(self.label[self.inblossom[s]], 1);
                        self.queue.push(s);
                    }
                    Delta::InnerEdge(k) => {
                        self.allowedge[k] = true;
                        let (i, _, _) = self.edges[k];
                        debug_assert_eq!(self.label[self.inblossom[i]], 1);
                        self.queue.push(i);
                    }
                    Delta::Expand(b) => self.expand_blossom(b, false),
                }
            }

            if !augmented {
                break;
            }

            for b in n..2 * n {
                if self.blossomparent[b] == NIL
                    && self.blossombase[b] != NIL
                    && self.label[b] == 1
                    && self.dualvar[b] == 0
                {
                    self.expand_blossom(b, true);
                }
            }
        }
    }
}

/// Kind of dual adjustment chosen at the end of a tree-growing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delta {
    None,
    /// Some vertex dual reaches zero; the stage ends.
    VertexDual,
    /// An edge from an S-vertex to a free vertex becomes tight.
    FreeEdge(usize),
    /// An edge between two S-blossoms becomes tight.
    InnerEdge(usize),
    /// A T-blossom's dual reaches zero and must be expanded.
    Expand(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(edges: &[(usize, usize, i128)], max_cardinality: bool) -> Vec<i64> {
        let n = edges.iter().map(|e| e.0.max(e.1) + 1).max().unwrap_or(0);
        max_weight_matching(n, edges, max_cardinality)
            .into_iter()
            .map(|m| m.map_or(-1, |v| v as i64))
            .collect()
    }

    #[test]
    fn empty_graph() {
        assert!(solve(&[], false).is_empty());
        assert_eq!(max_weight_matching(3, &[], true), vec![None, None, None]);
    }

    #[test]
    fn single_edge() {
        assert_eq!(solve(&[(0, 1, 1)], false), vec![1, 0]);
    }

    #[test]
    fn heavier_edge_wins() {
        assert_eq!(solve(&[(1, 2, 10), (2, 3, 11)], false), vec![-1, -1, 3, 2]);
    }

    #[test]
    fn path_prefers_middle_without_max_cardinality() {
        assert_eq!(
            solve(&[(1, 2, 5), (2, 3, 11), (3, 4, 5)], false),
            vec![-1, -1, 3, 2, -1]
        );
        assert_eq!(
            solve(&[(1, 2, 5), (2, 3, 11), (3, 4, 5)], true),
            vec![-1, 2, 1, 4, 3]
        );
    }

    #[test]
    fn negative_weights() {
        let edges = [(1, 2, 2), (1, 3, -2), (2, 3, 1), (2, 4, -1), (3, 4, -6)];
        assert_eq!(solve(&edges, false), vec![-1, 2, 1, -1, -1]);
        assert_eq!(solve(&edges, true), vec![-1, 3, 4, 1, 2]);
    }

    #[test]
    fn s_blossom() {
        assert_eq!(
            solve(&[(1, 2, 8), (1, 3, 9), (2, 3, 10), (3, 4, 7)], false),
            vec![-1, 2, 1, 4, 3]
        );
        assert_eq!(
            solve(
                &[(1, 2, 8), (1, 3, 9), (2, 3, 10), (3, 4, 7), (1, 6, 5), (4, 5, 6)],
                false
            ),
            vec![-1, 6, 3, 2, 5, 4, 1]
        );
    }

    #[test]
    fn t_blossom() {
        assert_eq!(
            solve(
                &[(1, 2, 9), (1, 3, 8), (2, 3, 10), (1, 4, 5), (4, 5, 4), (1, 6, 3)],
                false
            ),
            vec![-1, 6, 3, 2, 5, 4, 1]
        );
    }

    #[test]
    fn nested_s_blossom() {
        assert_eq!(
            solve(
                &[(1, 2, 9), (1, 3, 9), (2, 3, 10), (2, 4, 8), (3, 5, 8), (4, 5, 10), (5, 6, 6)],
                false
            ),
            vec![-1, 3, 4, 1, 2, 6, 5]
        );
    }

    #[test]
    fn nested_s_blossom_relabel() {
        let edges = [
            (1, 2, 10),
            (1, 7, 10),
            (2, 3, 12),
            (3, 4, 20),
            (3, 5, 20),
            (4, 5, 25),
            (5, 6, 10),
            (6, 7, 10),
            (7, 8, 8),
        ];
        assert_eq!(solve(&edges, false), vec![-1, 2, 1, 4, 3, 6, 5, 8, 7]);
    }

    #[test]
    fn nested_s_blossom_expand() {
        let edges = [
            (1, 2, 8),
            (1, 3, 8),
            (2, 3, 10),
            (2, 4, 12),
            (3, 5, 12),
            (4, 5, 14),
            (4, 6, 12),
            (5, 7, 12),
            (6, 7, 14),
            (7, 8, 12),
        ];
        assert_eq!(solve(&edges, false), vec![-1, 2, 1, 5, 6, 3, 4, 8, 7]);
    }

    #[test]
    fn s_blossom_relabel_t_expand() {
        let edges = [
            (1, 2, 23),
            (1, 5, 22),
            (1, 6, 15),
            (2, 3, 25),
            (3, 4, 22),
            (4, 5, 25),
            (4, 8, 14),
            (5, 7, 13),
        ];
        assert_eq!(solve(&edges, false), vec![-1, 6, 3, 2, 8, 7, 1, 5, 4]);
    }

    #[test]
    fn nested_s_blossom_t_expand() {
        let edges = [
            (1, 2, 19),
            (1, 3, 20),
            (1, 8, 8),
            (2, 3, 25),
            (2, 4, 18),
            (3, 5, 18),
            (4, 5, 13),
            (4, 7, 7),
            (5, 6, 7),
        ];
        assert_eq!(solve(&edges, false), vec![-1, 8, 3, 2, 7, 6, 5, 4, 1]);
    }

    #[test]
    fn nasty_t_blossom_expansions() {
        let base = [(1, 2, 45), (1, 5, 45), (2, 3, 50), (3, 4, 45), (4, 5, 50), (1, 6, 30), (3, 9, 35)];
        let expected = vec![-1, 6, 3, 2, 8, 7, 1, 5, 4, 10, 9];
        for tail in [
            [(4, 8, 35), (5, 7, 26), (9, 10, 5)],
            [(4, 8, 26), (5, 7, 40), (9, 10, 5)],
            [(4, 8, 28), (5, 7, 26), (9, 10, 5)],
        ] {
            let edges: Vec<_> = base.iter().chain(tail.iter()).copied().collect();
            assert_eq!(solve(&edges, false), expected);
        }
    }

    #[test]
    fn nested_t_blossom_expand() {
        let edges = [
            (1, 2, 45),
            (1, 7, 45),
            (2, 3, 50),
            (3, 4, 45),
            (4, 5, 95),
            (4, 6, 94),
            (5, 6, 94),
            (6, 7, 50),
            (1, 8, 30),
            (3, 11, 35),
            (5, 9, 36),
            (7, 10, 26),
            (11, 12, 5),
        ];
        assert_eq!(
            solve(&edges, false),
            vec![-1, 8, 3, 2, 6, 9, 4, 10, 1, 5, 7, 12, 11]
        );
    }

    #[test]
    fn nested_relabel_expand() {
        let edges = [
            (1, 2, 40),
            (1, 3, 40),
            (2, 3, 60),
            (2, 4, 55),
            (3, 5, 55),
            (4, 5, 50),
            (1, 8, 15),
            (5, 7, 30),
            (7, 6, 10),
            (8, 10, 10),
            (4, 9, 30),
        ];
        assert_eq!(solve(&edges, false), vec![-1, 2, 1, 5, 9, 3, 7, 6, 10, 4, 8]);
    }

    #[test]
    fn pairs_are_reported_once_in_index_order() {
        let mate = vec![Some(3), Some(2), Some(1), Some(0), None];
        assert_eq!(matched_pairs(&mate), vec![(0, 3), (1, 2)]);
    }

    #[test]
    fn complete_even_graph_is_perfect() {
        for n in [2usize, 4, 6, 8, 10] {
            let mut edges = Vec::new();
            for a in 0..n {
                for b in (a + 1)..n {
                    edges.push((a, b, ((a * 7 + b * 13) % 11 + 1) as i128));
                }
            }
            let mate = max_weight_matching(n, &edges, true);
            for (v, m) in mate.iter().enumerate() {
                let partner = m.expect("every vertex matched");
                assert_ne!(partner, v);
                assert_eq!(mate[partner], Some(v));
            }
        }
    }

    #[test]
    fn brute_force_agreement() {
        fn best(n: usize, w: &[Vec<Option<i128>>], free: u32) -> i128 {
            let Some(v) = (0..n).find(|&v| free & (1 << v) != 0) else {
                return 0;
            };
            let rest = free & !(1 << v);
            let mut top = best(n, w, rest);
            for u in 0..n {
                if rest & (1 << u) != 0 {
                    if let Some(x) = w[v][u] {
                        top = top.max(x + best(n, w, rest & !(1 << u)));
                    }
                }
            }
            top
        }

        // Deterministic pseudo-random graphs.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };
        for _ in 0..300 {
            let n = (next() % 8 + 1) as usize;
            let mut w = vec![vec![None; n]; n];
            let mut edges = Vec::new();
            for a in 0..n {
                for b in (a + 1)..n {
                    if next() % 10 < 6 {
                        let x = (next() % 36) as i128 - 5;
                        w[a][b] = Some(x);
                        w[b][a] = Some(x);
                        edges.push((a, b, x));
                    }
                }
            }
            let mate = max_weight_matching(n, &edges, false);
            let total: i128 = mate
                .iter()
                .enumerate()
                .filter_map(|(v, m)| m.filter(|&u| u > v).map(|u| w[v][u].unwrap()))
                .sum();
            assert_eq!(total, best(n, &w, (1u32 << n) - 1));
        }
    }
}
