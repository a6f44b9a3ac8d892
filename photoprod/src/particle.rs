use crate::error::{GeneratorError, Result};
use std::collections::HashMap;

/// Static properties of a particle species. Masses are in GeV, charges in units of |e|.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub name: &'static str,
    pub pdg: i32,
    pub mass: f64,
    pub charge: i32,
}

macro_rules! particle {
    ($name: expr, $pdg: expr, $mass: expr, $charge: expr) => {
        Particle {
            name: $name,
            pdg: $pdg,
            mass: $mass,
            charge: $charge,
        }
    };
}

lazy_static! {
    static ref PARTICLES: Vec<Particle> = vec![
        particle!("e-", 11, 0.000510999, -1),
        particle!("e+", -11, 0.000510999, 1),
        particle!("mu-", 13, 0.105658, -1),
        particle!("mu+", -13, 0.105658, 1),
        particle!("gamma", 22, 0., 0),
        particle!("pi0", 111, 0.134977, 0),
        particle!("pi+", 211, 0.13957, 1),
        particle!("pi-", -211, 0.13957, -1),
        particle!("eta", 221, 0.547862, 0),
        particle!("eta'", 331, 0.95778, 0),
        particle!("rho0", 113, 0.77526, 0),
        particle!("rho+", 213, 0.77526, 1),
        particle!("rho-", -213, 0.77526, -1),
        particle!("omega", 223, 0.78266, 0),
        particle!("phi", 333, 1.019461, 0),
        particle!("J/psi", 443, 3.0969, 0),
        particle!("K+", 321, 0.493677, 1),
        particle!("K-", -321, 0.493677, -1),
        particle!("K0", 311, 0.497611, 0),
        particle!("K0_S", 310, 0.497611, 0),
        particle!("K0_L", 130, 0.497611, 0),
        particle!("proton", 2212, 0.938272, 1),
        particle!("antiproton", -2212, 0.938272, -1),
        particle!("neutron", 2112, 0.939565, 0),
        particle!("Lambda0", 3122, 1.115683, 0),
        particle!("Sigma0", 3212, 1.192642, 0),
        particle!("Sigma+", 3222, 1.18937, 1),
        particle!("Delta++", 2224, 1.232, 2),
        particle!("Delta+", 2214, 1.232, 1),
        particle!("Delta0", 2114, 1.232, 0),
    ];
    static ref BY_NAME: HashMap<&'static str, usize> = {
        let mut map: HashMap<&'static str, usize> =
            PARTICLES.iter().enumerate().map(|(i, p)| (p.name, i)).collect();
        for &(alias, name) in [("p", "proton"), ("n", "neutron"), ("Lambda", "Lambda0"), ("e", "e-")].iter() {
            let index = map[name];
            map.insert(alias, index);
        }
        map
    };
    static ref BY_PDG: HashMap<i32, usize> =
        PARTICLES.iter().enumerate().map(|(i, p)| (p.pdg, i)).collect();
}

pub fn find_by_name(name: &str) -> Option<&'static Particle> {
    BY_NAME.get(name).map(|&i| &PARTICLES[i])
}

pub fn find_by_pdg(pdg: i32) -> Option<&'static Particle> {
    BY_PDG.get(&pdg).map(|&i| &PARTICLES[i])
}

/// Resolve a particle by name, failing with a configuration error if it is unknown.
pub fn lookup(name: &str) -> Result<Particle> {
    find_by_name(name)
        .cloned()
        .ok_or_else(|| GeneratorError::Configuration(format!("Can't find particle: {}", name)))
}
