use crate::{
    concurrency::par_iter_mut1,
    floating_type_mod::FT,
    particles::ParticleVec,
    sph_kernels::{smoothing_length, DimensionUtils},
    VF,
};

const MAX_NEIGHBOR_COUNT: usize = 20000;

/**
 * Cached pair quantities of particle i and its neighbor j.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborRecord<const D: usize> {
    pub j: u32,
    /// kernel value W_ij
    pub w_ij: FT,
    /// dW_ij/dr * V_j
    pub dw_ij_v_j: FT,
    /// unit vector pointing from j to i
    pub e_ij: VF<D>,
    pub r_ij: FT,
}

impl<const D: usize> NeighborRecord<D> {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.j as usize
    }

    /// Kernel gradient times neighbor volume.
    #[inline(always)]
    pub fn nabla_w_ij_v_j(&self) -> VF<D> {
        self.e_ij * self.dw_ij_v_j
    }
}

/**
 * This lists stores for each particle the records of its neighbors. The particle itself is never
 * part of its own list. The lists are read only while particle dynamics run.
 */
pub struct Neighborhood<const D: usize> {
    neighs: Vec<Vec<NeighborRecord<D>>>,
}

impl<const D: usize> Neighborhood<D> {
    pub fn new(num_particles: usize) -> Self {
        Neighborhood {
            neighs: (0..num_particles).map(|_| Vec::new()).collect(),
        }
    }

    /// Takes lists produced by an external neighbor search.
    pub fn from_lists(neighs: Vec<Vec<NeighborRecord<D>>>) -> Self {
        Neighborhood { neighs }
    }

    pub fn internal_lists(&self) -> &Vec<Vec<NeighborRecord<D>>> {
        &self.neighs
    }

    #[inline(always)]
    pub fn iter<'a>(&'a self, i: usize) -> impl Iterator<Item = &'a NeighborRecord<D>> + 'a {
        self.neighs[i].iter()
    }

    pub fn neighbor_count(&self, i: usize) -> usize {
        self.neighs[i].len()
    }

    pub fn len(&self) -> usize {
        self.neighs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighs.is_empty()
    }

    /// Drops every record at or beyond `cutoff_radius`.
    pub fn filter_down(&mut self, cutoff_radius: FT) {
        par_iter_mut1(&mut self.neighs, |_i, neigh_list| {
            neigh_list.retain(|record| record.r_ij < cutoff_radius);
        });
    }

    /**
     * Reference provider that tests all particle pairs. Kernel quantities use the
     * symmetrized smoothing length `(h[i] + h[j]) / 2` and the neighbor volume `m_j / rho_j`.
     */
    pub fn build_all_pairs<DU: DimensionUtils<D>>(&mut self, particles: &ParticleVec<D>, h: &[FT]) {
        let num_particles = particles.len();
        assert_eq!(h.len(), num_particles);
        self.neighs.resize_with(num_particles, Vec::new);

        let position = &particles.position;
        par_iter_mut1(&mut self.neighs, |i, p_neighs| {
            p_neighs.clear();
            for j in 0..num_particles {
                if j == i {
                    continue;
                }
                let x_ij = position[i] - position[j];
                let r_ij = x_ij.norm();
                let h_ij = smoothing_length(h, i, j);
                if r_ij >= h_ij * DU::support_radius_by_smoothing_length() || r_ij <= 0. {
                    continue;
                }
                if p_neighs.len() == MAX_NEIGHBOR_COUNT {
                    panic!("exceeded maximum allowed number of {} neighbors", MAX_NEIGHBOR_COUNT);
                }
                p_neighs.push(NeighborRecord {
                    j: j as u32,
                    w_ij: DU::kernelh(x_ij, h_ij),
                    dw_ij_v_j: DU::kernel_drh(r_ij, h_ij) * particles.volume(j),
                    e_ij: x_ij / r_ij,
                    r_ij,
                });
            }
        });
    }
}

#[test]
fn all_pairs_neighborhood_is_symmetric() {
    use crate::body::test_utils::{lattice_body_2d, neighborhood_of, water};

    let body = lattice_body_2d(6, 0.1, water());
    let neighs = neighborhood_of(&body);

    for i in 0..body.num_particles() {
        assert!(neighs.iter(i).all(|r| r.index() != i));
        for record in neighs.iter(i) {
            let j = record.index();
            let back = neighs
                .iter(j)
                .find(|r| r.index() == i)
                .expect("neighbor relation has to be symmetric");
            assert_eq!(back.w_ij, record.w_ij);
            assert!((back.e_ij + record.e_ij).norm() < 1e-12);
            assert!(record.dw_ij_v_j <= 0.);
        }
    }
}

#[test]
fn filter_down_truncates_by_distance() {
    use crate::body::test_utils::{center_index, lattice_body_2d, neighborhood_of, water};

    let body = lattice_body_2d(7, 0.1, water());
    let mut neighs = neighborhood_of(&body);
    let i = center_index(7);
    // support radius 2 * 1.3 * dp reaches 20 lattice neighbors
    assert_eq!(neighs.neighbor_count(i), 20);
    neighs.filter_down(0.1 * 1.01);
    assert_eq!(neighs.neighbor_count(i), 4);
}
