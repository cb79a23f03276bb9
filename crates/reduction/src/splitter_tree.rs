#![forbid(unsafe_code)]

use std::collections::VecDeque;

use crate::BlockIndex;
use crate::is_weight_equal;

/// A search tree keyed by accumulated transition weight, used to group the
/// predecessors of a splitter. Every node owns the block of states whose
/// weight matches the node's weight within the accuracy.
///
/// The two implementations are drop-in substitutable; the refinement only
/// relies on the insert and iteration semantics specified here.
pub trait SplitterTree: Default {
    /// Searches for a node whose weight matches the given weight within the
    /// accuracy and returns its block. Otherwise creates a new node owning
    /// `new_block` and returns None.
    fn insert(&mut self, weight: f64, new_block: BlockIndex) -> Option<BlockIndex>;

    /// Returns the blocks of all nodes in breadth-first order.
    fn blocks(&self) -> impl Iterator<Item = BlockIndex> + '_;

    /// Removes all nodes, so the next splitter starts from an empty tree.
    fn clear(&mut self);
}

/// A self-adjusting splay tree over an arena of nodes. The node reached by an
/// insertion is splayed to the root, so repeatedly hit weights stay cheap.
#[derive(Default)]
pub struct SplayTree {
    nodes: Vec<SplayNode>,
    root: Option<usize>,
}

#[derive(Debug)]
struct SplayNode {
    weight: f64,
    block: BlockIndex,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
}

impl SplitterTree for SplayTree {
    fn insert(&mut self, weight: f64, new_block: BlockIndex) -> Option<BlockIndex> {
        let mut parent = None;
        let mut cursor = self.root;
        while let Some(node) = cursor {
            if is_weight_equal(weight, self.nodes[node].weight) {
                let block = self.nodes[node].block;
                self.splay(node);
                return Some(block);
            }

            parent = Some(node);
            cursor = if weight < self.nodes[node].weight {
                self.nodes[node].left
            } else {
                self.nodes[node].right
            };
        }

        let node = self.nodes.len();
        self.nodes.push(SplayNode {
            weight,
            block: new_block,
            parent,
            left: None,
            right: None,
        });
        match parent {
            None => self.root = Some(node),
            Some(parent) => {
                if weight < self.nodes[parent].weight {
                    self.nodes[parent].left = Some(node);
                } else {
                    self.nodes[parent].right = Some(node);
                }
            }
        }

        self.splay(node);
        None
    }

    fn blocks(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        let mut queue: VecDeque<usize> = self.root.into_iter().collect();
        std::iter::from_fn(move || {
            let node = queue.pop_front()?;
            if let Some(left) = self.nodes[node].left {
                queue.push_back(left);
            }
            if let Some(right) = self.nodes[node].right {
                queue.push_back(right);
            }
            Some(self.nodes[node].block)
        })
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }
}

impl SplayTree {
    /// Moves the given node to the root of the tree.
    fn splay(&mut self, node: usize) {
        while let Some(parent) = self.nodes[node].parent {
            match self.nodes[parent].parent {
                None => {
                    if self.nodes[parent].left == Some(node) {
                        // zig rotation
                        self.rotate_right(parent);
                    } else {
                        // zag rotation
                        self.rotate_left(parent);
                    }
                }
                Some(grandparent) => {
                    let node_is_left = self.nodes[parent].left == Some(node);
                    let parent_is_left = self.nodes[grandparent].left == Some(parent);

                    if node_is_left && parent_is_left {
                        // zig-zig rotation
                        self.rotate_right(grandparent);
                        self.rotate_right(parent);
                    } else if !node_is_left && !parent_is_left {
                        // zag-zag rotation
                        self.rotate_left(grandparent);
                        self.rotate_left(parent);
                    } else if !node_is_left && parent_is_left {
                        // zig-zag rotation
                        self.rotate_left(parent);
                        self.rotate_right(grandparent);
                    } else {
                        // zag-zig rotation
                        self.rotate_right(parent);
                        self.rotate_left(grandparent);
                    }
                }
            }
        }
    }

    /// Rotates left at the given node; the rotation reassigns indices only.
    fn rotate_left(&mut self, node: usize) {
        let child = self.nodes[node].right.expect("Rotating left requires a right child");

        self.nodes[node].right = self.nodes[child].left;
        if let Some(right) = self.nodes[node].right {
            self.nodes[right].parent = Some(node);
        }

        self.nodes[child].parent = self.nodes[node].parent;
        match self.nodes[node].parent {
            None => self.root = Some(child),
            Some(parent) => {
                if self.nodes[parent].left == Some(node) {
                    self.nodes[parent].left = Some(child);
                } else {
                    self.nodes[parent].right = Some(child);
                }
            }
        }

        self.nodes[child].left = Some(node);
        self.nodes[node].parent = Some(child);
    }

    /// Rotates right at the given node.
    fn rotate_right(&mut self, node: usize) {
        let child = self.nodes[node].left.expect("Rotating right requires a left child");

        self.nodes[node].left = self.nodes[child].right;
        if let Some(left) = self.nodes[node].left {
            self.nodes[left].parent = Some(node);
        }

        self.nodes[child].parent = self.nodes[node].parent;
        match self.nodes[node].parent {
            None => self.root = Some(child),
            Some(parent) => {
                if self.nodes[parent].right == Some(node) {
                    self.nodes[parent].right = Some(child);
                } else {
                    self.nodes[parent].left = Some(child);
                }
            }
        }

        self.nodes[child].right = Some(node);
        self.nodes[node].parent = Some(child);
    }
}

/// A red-black tree over an arena of nodes. Joining an existing node does not
/// change the structure, so only structural insertions pay the fix-up.
#[derive(Default)]
pub struct RedBlackTree {
    nodes: Vec<RbNode>,
    root: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug)]
struct RbNode {
    weight: f64,
    block: BlockIndex,
    color: Color,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
}

impl SplitterTree for RedBlackTree {
    fn insert(&mut self, weight: f64, new_block: BlockIndex) -> Option<BlockIndex> {
        let mut parent = None;
        let mut cursor = self.root;
        while let Some(node) = cursor {
            if is_weight_equal(weight, self.nodes[node].weight) {
                return Some(self.nodes[node].block);
            }

            parent = Some(node);
            cursor = if weight < self.nodes[node].weight {
                self.nodes[node].left
            } else {
                self.nodes[node].right
            };
        }

        let node = self.nodes.len();
        self.nodes.push(RbNode {
            weight,
            block: new_block,
            color: Color::Red,
            parent,
            left: None,
            right: None,
        });
        match parent {
            None => self.root = Some(node),
            Some(parent) => {
                if weight < self.nodes[parent].weight {
                    self.nodes[parent].left = Some(node);
                } else {
                    self.nodes[parent].right = Some(node);
                }
            }
        }

        self.fix_insert(node);
        None
    }

    fn blocks(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        let mut queue: VecDeque<usize> = self.root.into_iter().collect();
        std::iter::from_fn(move || {
            let node = queue.pop_front()?;
            if let Some(left) = self.nodes[node].left {
                queue.push_back(left);
            }
            if let Some(right) = self.nodes[node].right {
                queue.push_back(right);
            }
            Some(self.nodes[node].block)
        })
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }
}

impl RedBlackTree {
    fn is_red(&self, node: Option<usize>) -> bool {
        node.is_some_and(|node| self.nodes[node].color == Color::Red)
    }

    /// Restores the red-black properties after inserting the given red node.
    fn fix_insert(&mut self, mut node: usize) {
        while self.root != Some(node) && self.is_red(self.nodes[node].parent) {
            let parent = self.nodes[node].parent.expect("A non-root node has a parent");
            let grandparent = self.nodes[parent].parent.expect("A red node has a parent");

            if self.nodes[grandparent].left == Some(parent) {
                let uncle = self.nodes[grandparent].right;
                if self.is_red(uncle) {
                    self.nodes[parent].color = Color::Black;
                    self.nodes[uncle.expect("A red uncle exists")].color = Color::Black;
                    self.nodes[grandparent].color = Color::Red;
                    node = grandparent;
                } else {
                    if self.nodes[parent].right == Some(node) {
                        self.rotate_left(parent);
                        node = parent;
                    }
                    let parent = self.nodes[node].parent.expect("A non-root node has a parent");
                    self.rotate_right(grandparent);
                    self.nodes[parent].color = Color::Black;
                    self.nodes[grandparent].color = Color::Red;
                    node = parent;
                }
            } else {
                let uncle = self.nodes[grandparent].left;
                if self.is_red(uncle) {
                    self.nodes[parent].color = Color::Black;
                    self.nodes[uncle.expect("A red uncle exists")].color = Color::Black;
                    self.nodes[grandparent].color = Color::Red;
                    node = grandparent;
                } else {
                    if self.nodes[parent].left == Some(node) {
                        self.rotate_right(parent);
                        node = parent;
                    }
                    let parent = self.nodes[node].parent.expect("A non-root node has a parent");
                    self.rotate_left(grandparent);
                    self.nodes[parent].color = Color::Black;
                    self.nodes[grandparent].color = Color::Red;
                    node = parent;
                }
            }
        }

        let root = self.root.expect("Fixing up requires a non-empty tree");
        self.nodes[root].color = Color::Black;
    }

    fn rotate_left(&mut self, node: usize) {
        let child = self.nodes[node].right.expect("Rotating left requires a right child");

        self.nodes[node].right = self.nodes[child].left;
        if let Some(left) = self.nodes[child].left {
            self.nodes[left].parent = Some(node);
        }

        self.nodes[child].parent = self.nodes[node].parent;
        match self.nodes[node].parent {
            None => self.root = Some(child),
            Some(parent) => {
                if self.nodes[parent].left == Some(node) {
                    self.nodes[parent].left = Some(child);
                } else {
                    self.nodes[parent].right = Some(child);
                }
            }
        }

        self.nodes[child].left = Some(node);
        self.nodes[node].parent = Some(child);
    }

    fn rotate_right(&mut self, node: usize) {
        let child = self.nodes[node].left.expect("Rotating right requires a left child");

        self.nodes[node].left = self.nodes[child].right;
        if let Some(right) = self.nodes[child].right {
            self.nodes[right].parent = Some(node);
        }

        self.nodes[child].parent = self.nodes[node].parent;
        match self.nodes[node].parent {
            None => self.root = Some(child),
            Some(parent) => {
                if self.nodes[parent].right == Some(node) {
                    self.nodes[parent].right = Some(child);
                } else {
                    self.nodes[parent].left = Some(child);
                }
            }
        }

        self.nodes[child].right = Some(node);
        self.nodes[node].parent = Some(child);
    }
}
