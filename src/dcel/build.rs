//! Conversion between `Dcel` and indexed triangle lists.

use fxhash::FxHashMap;
use optional::Optioned as Opt;

use crate::{
    error::{Error, Result},
    handle::{FaceHandle, Handle, HalfEdgeHandle, VertexHandle},
    map::DenseMap,
    math::Point,
};
use super::{Dcel, Face, FullEdge, HalfEdge, Vertex};


/// A triangle mesh given as list of positions and list of index triples.
///
/// Triangles are counter clockwise when looking at the front side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedMesh {
    pub positions: Vec<Point>,
    pub triangles: Vec<[usize; 3]>,
}

impl IndexedMesh {
    pub fn new(positions: Vec<Point>, triangles: Vec<[usize; 3]>) -> Self {
        Self { positions, triangles }
    }

    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn num_faces(&self) -> usize {
        self.triangles.len()
    }
}


impl Dcel {
    /// Builds a half edge mesh from an indexed triangle list.
    ///
    /// Vertex `i` of the input gets the handle with index `i`, the same goes
    /// for faces. Positions not referenced by any triangle become isolated
    /// vertices.
    ///
    /// Fails with `Error::InvalidInput` if an index is out of bounds and with
    /// `Error::Topology` if the triangles do not describe an oriented
    /// 2-manifold: a triangle using the same vertex twice, a directed edge
    /// used by two triangles (either more than two faces meet at an edge or
    /// neighbors are inconsistently oriented) or a vertex with more than one
    /// fan of faces around it.
    pub fn from_triangles(positions: &[Point], triangles: &[[usize; 3]]) -> Result<Self> {
        for (i, tri) in triangles.iter().enumerate() {
            if let Some(&idx) = tri.iter().find(|&&idx| idx >= positions.len()) {
                return Err(Error::InvalidInput(format!(
                    "triangle {} references vertex {}, but there are only {} vertices",
                    i,
                    idx,
                    positions.len(),
                )));
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                return Err(Error::Topology(format!(
                    "triangle {} uses the same vertex more than once: {:?}",
                    i,
                    tri,
                )));
            }
        }

        let mut out = Dcel {
            vertices: DenseMap::with_capacity(positions.len()),
            half_edges: DenseMap::with_capacity(triangles.len() * 3 + 6),
            edges: DenseMap::with_capacity(triangles.len() * 3 / 2 + 3),
            faces: DenseMap::with_capacity(triangles.len()),
        };

        for &position in positions {
            out.vertices.push(Vertex { position, outgoing: Opt::none() });
        }

        // ===================================================================
        // ===== Create faces and (pairs of) half edges
        // ===================================================================
        let mut directed: FxHashMap<(VertexHandle, VertexHandle), HalfEdgeHandle>
            = FxHashMap::default();

        for (i, tri) in triangles.iter().enumerate() {
            let vs = [
                VertexHandle::from_usize(tri[0]),
                VertexHandle::from_usize(tri[1]),
                VertexHandle::from_usize(tri[2]),
            ];

            let face = FaceHandle::from_usize(i);
            let mut inner = [HalfEdgeHandle::new(0); 3];
            for j in 0..3 {
                let (from, to) = (vs[j], vs[(j + 1) % 3]);
                let he = match directed.get(&(from, to)).cloned() {
                    // Created as twin of an earlier face's half edge.
                    Some(he) if out.half_edges[he].face.is_none() => he,
                    Some(_) => {
                        return Err(Error::Topology(format!(
                            "triangle {} adds a non-manifold edge between vertex {} and {} \
                                (edge already used in this direction)",
                            i,
                            from.idx(),
                            to.idx(),
                        )));
                    }
                    None => {
                        let (he, twin) = out.add_edge_pair(from, to);
                        directed.insert((from, to), he);
                        directed.insert((to, from), twin);
                        he
                    }
                };
                inner[j] = he;
            }

            let pushed = out.faces.push(Face { edge: inner[0] });
            debug_assert_eq!(pushed, face);
            for j in 0..3 {
                let he = &mut out.half_edges[inner[j]];
                he.face = Opt::some(face);
                he.next = inner[(j + 1) % 3];
                he.prev = inner[(j + 2) % 3];
            }
        }

        // ===================================================================
        // ===== Link boundary half edges into hole loops
        // ===================================================================
        let mut boundary_out: FxHashMap<VertexHandle, HalfEdgeHandle> = FxHashMap::default();
        for (he, data) in out.half_edges.iter() {
            if data.face.is_none() && boundary_out.insert(data.origin, he).is_some() {
                return Err(Error::Topology(format!(
                    "vertex {} is non-manifold (more than one fan of faces meet there)",
                    data.origin.idx(),
                )));
            }
        }

        for (&v, &he) in &boundary_out {
            out.vertices[v].outgoing = Opt::some(he);
            let target = out.target(he);
            let next = boundary_out[&target];
            out.half_edges[he].next = next;
            out.half_edges[next].prev = he;
        }

        for (he, data) in out.half_edges.iter() {
            let outgoing = &mut out.vertices[data.origin].outgoing;
            if outgoing.is_none() {
                *outgoing = Opt::some(he);
            }
        }

        // ===================================================================
        // ===== Check for vertices with multiple closed fans
        // ===================================================================
        let mut num_outgoing: FxHashMap<VertexHandle, usize> = FxHashMap::default();
        for (from, _) in directed.keys() {
            *num_outgoing.entry(*from).or_insert(0) += 1;
        }

        for (&v, &expected) in &num_outgoing {
            if out.outgoing_half_edges(v).take(expected + 1).count() != expected {
                return Err(Error::Topology(format!(
                    "vertex {} is non-manifold (more than one fan of faces meet there)",
                    v.idx(),
                )));
            }
        }

        Ok(out)
    }

    /// Creates the two half edges and the full edge between `from` and `to`.
    /// Returns `(from -> to, to -> from)`. `face`, `next` and `prev` are
    /// dummy values and have to be set by the caller.
    fn add_edge_pair(
        &mut self,
        from: VertexHandle,
        to: VertexHandle,
    ) -> (HalfEdgeHandle, HalfEdgeHandle) {
        let edge = self.edges.next_push_handle();
        let he = self.half_edges.next_push_handle();
        let twin = HalfEdgeHandle::new(he.idx() + 1);

        let dummy = HalfEdge {
            origin: from,
            twin,
            next: he,
            prev: he,
            face: Opt::none(),
            edge,
        };
        self.half_edges.push(dummy);
        self.half_edges.push(HalfEdge { origin: to, twin: he, next: twin, prev: twin, ..dummy });
        self.edges.push(FullEdge { half: [he, twin] });

        (he, twin)
    }

    /// Exports the current state as indexed triangle list.
    ///
    /// Vertices and faces are numbered in handle order, skipping holes in
    /// the handle space. Isolated vertices are exported, too.
    pub fn to_indexed(&self) -> IndexedMesh {
        let mut index_of = DenseMap::with_capacity(self.vertices.num_elements() as usize);
        let mut positions = Vec::with_capacity(self.vertices.num_elements() as usize);
        for (v, data) in self.vertices.iter() {
            index_of.insert(v, positions.len());
            positions.push(data.position);
        }

        let triangles = self.faces()
            .map(|f| {
                let [a, b, c] = self.vertices_of_face(f);
                [index_of[a], index_of[b], index_of[c]]
            })
            .collect();

        IndexedMesh { positions, triangles }
    }

    /// Returns a compact copy of this mesh: all handle spaces are free of
    /// holes. Note that handles of the copy differ from the handles of this
    /// mesh whenever this mesh was not compact.
    pub fn compacted(&self) -> Result<Self> {
        let IndexedMesh { positions, triangles } = self.to_indexed();
        Self::from_triangles(&positions, &triangles)
    }
}
