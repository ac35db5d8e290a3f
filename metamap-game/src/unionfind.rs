//! Disjoint sets over dense integer keys.
//!
//! Keys are composite 16-bit values (`pos << 8 | subtile`), so the node
//! lookup is a flat slot array sized to the key space instead of a hash map.

pub struct UnionFind {
    /// key -> node index, or -1 while the key is unseen.
    slot: Vec<i32>,
    parent: Vec<u32>,
    size: Vec<u32>,
    key: Vec<u32>,
}

impl UnionFind {
    pub fn new(key_space: usize) -> Self {
        UnionFind {
            slot: vec![-1; key_space],
            parent: Vec::new(),
            size: Vec::new(),
            key: Vec::new(),
        }
    }

    fn node(&mut self, key: u32) -> usize {
        let s = self.slot[key as usize];
        if s >= 0 {
            return s as usize;
        }
        let n = self.parent.len();
        self.slot[key as usize] = n as i32;
        self.parent.push(n as u32);
        self.size.push(1);
        self.key.push(key);
        n
    }

    fn find(&mut self, mut n: usize) -> usize {
        while self.parent[n] as usize != n {
            let grandparent = self.parent[self.parent[n] as usize];
            self.parent[n] = grandparent;
            n = grandparent as usize;
        }
        n
    }

    /// Registers `keys` and unions them all into one set.
    pub fn union(&mut self, keys: &[u32]) {
        let Some((&first, rest)) = keys.split_first() else {
            return;
        };
        let mut root = self.node(first);
        root = self.find(root);
        for &k in rest {
            let n = self.node(k);
            let r = self.find(n);
            if r == root {
                continue;
            }
            let (big, small) = if self.size[root] >= self.size[r] {
                (root, r)
            } else {
                (r, root)
            };
            self.parent[small] = big as u32;
            self.size[big] += self.size[small];
            root = big;
        }
    }

    pub fn same(&mut self, a: u32, b: u32) -> bool {
        let na = self.slot[a as usize];
        let nb = self.slot[b as usize];
        if na < 0 || nb < 0 {
            return false;
        }
        self.find(na as usize) == self.find(nb as usize)
    }

    /// All registered sets, each as a list of keys in registration order.
    pub fn sets(&mut self) -> Vec<Vec<u32>> {
        let mut roots: Vec<i32> = vec![-1; self.parent.len()];
        let mut out: Vec<Vec<u32>> = Vec::new();
        for n in 0..self.parent.len() {
            let r = self.find(n);
            if roots[r] < 0 {
                roots[r] = out.len() as i32;
                out.push(Vec::new());
            }
            out[roots[r] as usize].push(self.key[n]);
        }
        out
    }
}
