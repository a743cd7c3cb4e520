//! Progressive compression and decompression controllers.
//!
//! A [`Compressor`] owns the fine mesh and decimates it layer by layer; a
//! [`Decompressor`] owns the coarsest mesh and replays stored layers in
//! reverse. Both expose the same stepping surface: `step` advances one
//! queue element, `batch` finishes the current layer, `complete` runs to
//! the end, and `complete_until` adds cooperative cancellation between
//! layers. Exactly one controller mutates a mesh; execution is synchronous
//! and fully deterministic.

use glam::{DVec3, IVec3};

use promesh_mesh::{HalfEdgeMesh, HalfedgeId, MeshError, VertexId};
use promesh_stream::{
    BitReader, BitWriter, StreamHeader, read_frame, read_varint, write_frame, write_varint,
};

use crate::config::Config;
use crate::conquest::{
    DecodePass, EncodePass, Phase, lift_corners, parse_layer, probe_layer, select_gates,
};
use crate::error::{ConfigError, Error, Result, corrupt};
use crate::quant::Quantizer;

/// Outcome of a single controller step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One queue element was consumed; the current layer continues.
    Progress,
    /// The current layer finished; more remain.
    LayerComplete,
    /// Nothing is left to do.
    Finished,
}

/// Outcome of a cancellable run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// All work finished.
    Finished,
    /// Cancelled between layers; every applied layer is fully in effect.
    Cancelled {
        /// Layers applied before the cancellation was observed.
        layers_applied: usize,
    },
}

/// Map a decompression percentage onto a layer count.
fn layer_target(percentage: f64, total: usize) -> Result<usize> {
    if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
        return Err(ConfigError::Percentage { value: percentage }.into());
    }
    Ok(((percentage / 100.0) * total as f64).round() as usize)
}

/// Ranks of live vertices in iteration order, indexed by handle.
fn vertex_ranks(mesh: &HalfEdgeMesh) -> Vec<u32> {
    let top = mesh.vertex_ids().map(VertexId::index).max().unwrap_or(0);
    let mut ranks = vec![0u32; top + 1];
    for (rank, v) in mesh.vertex_ids().enumerate() {
        ranks[v.index()] = rank as u32;
    }
    ranks
}

/// Progressive mesh compressor.
#[derive(Debug)]
pub struct Compressor {
    mesh: HalfEdgeMesh,
    config: Config,
    quantizer: Quantizer,
    gates: Vec<HalfedgeId>,
    layers: Vec<Vec<u8>>,
    pass: Option<EncodePass>,
    finished: bool,
}

impl Compressor {
    /// Quantize and index an input mesh for compression.
    ///
    /// The mesh must be closed and manifold; facet corner loops are
    /// counter-clockwise indices into `positions`.
    pub fn new(positions: &[DVec3], faces: &[Vec<u32>], config: Config) -> Result<Self> {
        config.validate()?;
        let Some(quantizer) = Quantizer::from_points(positions, config.quantization_bits) else {
            return Err(Error::InputMesh(MeshError::InvalidTopology {
                detail: "input has no vertices".to_string(),
            }));
        };
        let quantized: Vec<IVec3> = positions.iter().map(|&p| quantizer.quantize(p)).collect();
        let mesh = HalfEdgeMesh::from_faces(quantized, faces)?;
        mesh.validate()?;
        if !mesh.is_closed() {
            return Err(Error::InputMesh(MeshError::OpenMesh {
                boundary_edges: mesh.boundary_halfedge_count(),
            }));
        }
        let gates = select_gates(&mesh);
        tracing::debug!(
            vertices = mesh.vertex_count(),
            facets = mesh.facet_count(),
            regions = gates.len(),
            bits = config.quantization_bits,
            "compressor ready"
        );
        Ok(Self {
            mesh,
            config,
            quantizer,
            gates,
            layers: Vec::new(),
            pass: None,
            finished: false,
        })
    }

    /// Advance one conquest step.
    pub fn step(&mut self) -> Result<Step> {
        if self.finished {
            return Ok(Step::Finished);
        }
        if self.pass.is_none() {
            let triangle = self.mesh.is_triangle_only() && self.config.triangle_face_prediction;
            self.pass = Some(EncodePass::new(triangle));
        }
        let Some(pass) = self.pass.as_mut() else {
            return Ok(Step::Finished);
        };
        let phase = pass.step(&mut self.mesh, &self.config, &self.gates)?;
        if phase != Phase::StepComplete {
            return Ok(Step::Progress);
        }
        let Some(pass) = self.pass.take() else {
            return Ok(Step::Finished);
        };
        if pass.removed() == 0 {
            // A fruitless pass is discarded, not stored.
            self.mesh.reset_conquest_tags();
            self.finished = true;
            tracing::debug!(
                layers = self.layers.len(),
                vertices = self.mesh.vertex_count(),
                "compression finished"
            );
            return Ok(Step::Finished);
        }
        let removed = pass.removed();
        let blob = pass.commit(&mut self.mesh, &self.config);
        self.layers.push(blob);
        tracing::debug!(
            layer = self.layers.len(),
            removed,
            vertices = self.mesh.vertex_count(),
            "layer committed"
        );
        Ok(Step::LayerComplete)
    }

    /// Run the current layer to its end (at least one layer of work).
    pub fn batch(&mut self) -> Result<Step> {
        loop {
            match self.step()? {
                Step::Progress => {}
                done => return Ok(done),
            }
        }
    }

    /// Decimate until no layer removes a vertex. Idempotent.
    pub fn complete(&mut self) -> Result<()> {
        while !matches!(self.step()?, Step::Finished) {}
        Ok(())
    }

    /// Like [`Self::complete`], but checks `cancel` between layers.
    pub fn complete_until(&mut self, cancel: impl Fn() -> bool) -> Result<Completion> {
        loop {
            if self.finished {
                return Ok(Completion::Finished);
            }
            if cancel() {
                return Ok(Completion::Cancelled {
                    layers_applied: self.layers.len(),
                });
            }
            if matches!(self.batch()?, Step::Finished) {
                return Ok(Completion::Finished);
            }
        }
    }

    /// Complete if needed and serialize the stream.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.complete()?;
        let mut out = Vec::new();
        StreamHeader {
            quantization_bits: self.config.quantization_bits,
            flags: self.config.flags(),
            center: self.quantizer.center(),
            diagonal: self.quantizer.diagonal(),
        }
        .write(&mut out);

        // Coarsest mesh: bit-packed positions, then facet corner loops and
        // gates as vertex ranks.
        let ranks = vertex_ranks(&self.mesh);
        write_varint(&mut out, self.mesh.vertex_count() as u32);
        let width = u32::from(self.config.quantization_bits);
        let mut bits = BitWriter::new();
        for v in self.mesh.vertex_ids() {
            let p = self.mesh.position(v);
            for component in [p.x, p.y, p.z] {
                bits.write_bits(component as u32, width);
            }
        }
        out.extend(bits.into_bytes());

        write_varint(&mut out, self.mesh.facet_count() as u32);
        for f in self.mesh.facet_ids() {
            write_varint(&mut out, self.mesh.facet_degree(f) as u32);
            for h in self.mesh.facet_halfedges(f) {
                write_varint(&mut out, ranks[self.mesh.origin(h).index()]);
            }
        }

        write_varint(&mut out, self.gates.len() as u32);
        for &gate in &self.gates {
            write_varint(&mut out, ranks[self.mesh.origin(gate).index()]);
            write_varint(&mut out, ranks[self.mesh.destination(gate).index()]);
        }

        write_varint(&mut out, self.layers.len() as u32);
        for layer in &self.layers {
            write_frame(&mut out, layer);
        }
        tracing::debug!(bytes = out.len(), layers = self.layers.len(), "stream serialized");
        Ok(out)
    }

    /// Current mesh, including conquest tags and edge kinds.
    #[must_use]
    pub fn mesh(&self) -> &HalfEdgeMesh {
        &self.mesh
    }

    /// Dequantized positions of the live vertices, in rank order.
    #[must_use]
    pub fn positions(&self) -> Vec<DVec3> {
        self.mesh
            .vertex_ids()
            .map(|v| self.quantizer.dequantize(self.mesh.position(v)))
            .collect()
    }

    /// Facet corner loops as vertex ranks.
    #[must_use]
    pub fn facets(&self) -> Vec<Vec<u32>> {
        let ranks = vertex_ranks(&self.mesh);
        self.mesh
            .facet_ids()
            .map(|f| {
                self.mesh
                    .facet_halfedges(f)
                    .map(|h| ranks[self.mesh.origin(h).index()])
                    .collect()
            })
            .collect()
    }

    /// Quantization mapping in effect.
    #[must_use]
    pub fn quantizer(&self) -> Quantizer {
        self.quantizer
    }

    /// Current decimation level (layers committed so far).
    #[must_use]
    pub fn level(&self) -> u32 {
        self.mesh.level()
    }

    /// Layers committed so far.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Conquest phase of the in-flight layer.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.pass.as_ref().map_or(Phase::StepComplete, EncodePass::phase)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Progressive mesh decompressor.
#[derive(Debug)]
pub struct Decompressor {
    mesh: HalfEdgeMesh,
    config: Config,
    quantizer: Quantizer,
    gates: Vec<HalfedgeId>,
    /// Layer blobs in simplification order; applied from the back.
    layers: Vec<Vec<u8>>,
    target_layers: usize,
    applied: usize,
    pass: Option<DecodePass>,
    checkpoint: Option<HalfEdgeMesh>,
}

impl Decompressor {
    /// Parse a stream and rebuild its coarsest mesh.
    ///
    /// `target_percentage` selects how much of the layer sequence
    /// [`Self::complete`] will apply; `0.0` stays at the coarsest mesh.
    pub fn new(bytes: &[u8], target_percentage: f64) -> Result<Self> {
        let mut offset = 0;
        let header = StreamHeader::read(bytes, &mut offset)?;
        let config = Config::from_flags(header.quantization_bits, header.flags);
        let quantizer = Quantizer::from_header(header.center, header.diagonal, header.quantization_bits);

        let vertex_count = read_varint(bytes, &mut offset)? as usize;
        if vertex_count == 0 {
            return Err(corrupt("base mesh", "zero vertices"));
        }
        let width = u32::from(header.quantization_bits);
        let block = (vertex_count * 3 * width as usize).div_ceil(8);
        let packed = promesh_stream::take(bytes, &mut offset, block, "base positions")?;
        let mut reader = BitReader::new(packed);
        let mut positions = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            let x = reader.read_bits(width)? as i32;
            let y = reader.read_bits(width)? as i32;
            let z = reader.read_bits(width)? as i32;
            positions.push(IVec3::new(x, y, z));
        }

        // Declared counts are untrusted; every element costs at least one
        // byte, so cap reservations at the bytes actually left.
        let remaining = |offset: usize| bytes.len().saturating_sub(offset);

        let facet_count = read_varint(bytes, &mut offset)? as usize;
        let mut faces = Vec::with_capacity(facet_count.min(remaining(offset)));
        for _ in 0..facet_count {
            let degree = read_varint(bytes, &mut offset)? as usize;
            let mut corners = Vec::with_capacity(degree.min(remaining(offset)));
            for _ in 0..degree {
                let rank = read_varint(bytes, &mut offset)?;
                if rank as usize >= vertex_count {
                    return Err(corrupt(
                        "base mesh",
                        format!("corner rank {rank} outside 0..{vertex_count}"),
                    ));
                }
                corners.push(rank);
            }
            faces.push(corners);
        }
        let mesh = HalfEdgeMesh::from_faces(positions, &faces)
            .map_err(|err| corrupt("base mesh", err.to_string()))?;
        mesh.validate()
            .map_err(|err| corrupt("base mesh", err.to_string()))?;
        if !mesh.is_closed() {
            return Err(corrupt("base mesh", "coarsest mesh is not closed"));
        }

        let ids: Vec<VertexId> = mesh.vertex_ids().collect();
        let gate_count = read_varint(bytes, &mut offset)? as usize;
        let mut gates = Vec::with_capacity(gate_count.min(remaining(offset)));
        for _ in 0..gate_count {
            let from = read_varint(bytes, &mut offset)? as usize;
            let to = read_varint(bytes, &mut offset)? as usize;
            let (Some(&from), Some(&to)) = (ids.get(from), ids.get(to)) else {
                return Err(corrupt("region gate", "vertex rank out of range"));
            };
            let Some(gate) = mesh.find_halfedge(from, to) else {
                return Err(corrupt(
                    "region gate",
                    format!("no edge from {from} to {to}"),
                ));
            };
            gates.push(gate);
        }

        let layer_count = read_varint(bytes, &mut offset)? as usize;
        let mut layers = Vec::with_capacity(layer_count.min(remaining(offset)));
        for _ in 0..layer_count {
            layers.push(read_frame(bytes, &mut offset)?.to_vec());
        }
        if offset != bytes.len() {
            return Err(corrupt(
                "stream tail",
                format!("{} trailing bytes", bytes.len() - offset),
            ));
        }

        let target_layers = layer_target(target_percentage, layers.len())?;
        let mut mesh = mesh;
        mesh.set_level(layers.len() as u32);
        tracing::debug!(
            vertices = mesh.vertex_count(),
            facets = mesh.facet_count(),
            layers = layers.len(),
            target_layers,
            "decompressor ready"
        );
        Ok(Self {
            mesh,
            config,
            quantizer,
            gates,
            layers,
            target_layers,
            applied: 0,
            pass: None,
            checkpoint: None,
        })
    }

    /// Probe the next layer on a clone, canonicalize lifted corners, and
    /// open the positional replay. The checkpoint is taken first so any
    /// failure rolls the mesh back untouched.
    fn begin_layer(&mut self) -> Result<()> {
        let blob_index = self.layers.len() - 1 - self.applied;
        let blob = self.layers[blob_index].clone();
        self.checkpoint = Some(self.mesh.clone());
        let opened = (|| -> Result<DecodePass> {
            let splits = probe_layer(&self.mesh, &self.config, &self.gates, &blob)?;
            lift_corners(&mut self.mesh, &self.config, &splits)?;
            Ok(DecodePass::positional(parse_layer(&blob, &self.config)?))
        })();
        match opened {
            Ok(pass) => {
                self.pass = Some(pass);
                Ok(())
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    /// Discard the in-flight layer and restore the pre-layer mesh.
    fn rollback(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            self.mesh = checkpoint;
        }
        self.pass = None;
    }

    /// Advance one refinement step toward the target.
    pub fn step(&mut self) -> Result<Step> {
        if self.applied >= self.target_layers {
            return Ok(Step::Finished);
        }
        if self.pass.is_none() {
            self.begin_layer()?;
        }
        let Some(pass) = self.pass.as_mut() else {
            return Ok(Step::Finished);
        };
        let phase = match pass.step(&mut self.mesh, &self.config, &self.gates) {
            Ok(phase) => phase,
            Err(err) => {
                self.rollback();
                return Err(err);
            }
        };
        if phase != Phase::StepComplete {
            return Ok(Step::Progress);
        }
        let Some(pass) = self.pass.take() else {
            return Ok(Step::Finished);
        };
        if let Err(err) = pass.ensure_consumed() {
            self.rollback();
            return Err(err);
        }
        self.mesh.settle_edge_kinds();
        self.mesh.reclaim();
        self.mesh.set_level(self.mesh.level().saturating_sub(1));
        self.checkpoint = None;
        self.applied += 1;
        tracing::debug!(
            applied = self.applied,
            inserted = pass.inserted(),
            vertices = self.mesh.vertex_count(),
            "layer applied"
        );
        if self.applied >= self.target_layers {
            return Ok(Step::Finished);
        }
        Ok(Step::LayerComplete)
    }

    /// Run the current layer to its end (at least one layer of work).
    pub fn batch(&mut self) -> Result<Step> {
        loop {
            match self.step()? {
                Step::Progress => {}
                done => return Ok(done),
            }
        }
    }

    /// Apply layers up to the percentage target. Idempotent.
    pub fn complete(&mut self) -> Result<()> {
        while !matches!(self.step()?, Step::Finished) {}
        Ok(())
    }

    /// Like [`Self::complete`], but checks `cancel` between layers.
    pub fn complete_until(&mut self, cancel: impl Fn() -> bool) -> Result<Completion> {
        loop {
            if self.applied >= self.target_layers {
                return Ok(Completion::Finished);
            }
            if cancel() {
                return Ok(Completion::Cancelled {
                    layers_applied: self.applied,
                });
            }
            if matches!(self.batch()?, Step::Finished) {
                return Ok(Completion::Finished);
            }
        }
    }

    /// Raise the percentage target and decode up to it.
    pub fn decode_to(&mut self, percentage: f64) -> Result<()> {
        let target = layer_target(percentage, self.layers.len())?;
        self.target_layers = self.target_layers.max(target);
        self.complete()
    }

    /// Current mesh, including conquest tags and edge kinds.
    #[must_use]
    pub fn mesh(&self) -> &HalfEdgeMesh {
        &self.mesh
    }

    /// Dequantized positions of the live vertices, in rank order.
    #[must_use]
    pub fn positions(&self) -> Vec<DVec3> {
        self.mesh
            .vertex_ids()
            .map(|v| self.quantizer.dequantize(self.mesh.position(v)))
            .collect()
    }

    /// Facet corner loops as vertex ranks.
    #[must_use]
    pub fn facets(&self) -> Vec<Vec<u32>> {
        let ranks = vertex_ranks(&self.mesh);
        self.mesh
            .facet_ids()
            .map(|f| {
                self.mesh
                    .facet_halfedges(f)
                    .map(|h| ranks[self.mesh.origin(h).index()])
                    .collect()
            })
            .collect()
    }

    /// Quantization mapping declared by the stream.
    #[must_use]
    pub fn quantizer(&self) -> Quantizer {
        self.quantizer
    }

    /// Codec configuration declared by the stream.
    #[must_use]
    pub fn config(&self) -> Config {
        self.config
    }

    /// Current refinement level (remaining undone layers).
    #[must_use]
    pub fn level(&self) -> u32 {
        self.mesh.level()
    }

    /// Layers applied so far.
    #[must_use]
    pub fn applied_layers(&self) -> usize {
        self.applied
    }

    /// Layers stored in the stream.
    #[must_use]
    pub fn total_layers(&self) -> usize {
        self.layers.len()
    }

    /// Conquest phase of the in-flight layer.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.pass.as_ref().map_or(Phase::StepComplete, DecodePass::phase)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.applied >= self.target_layers
    }
}
