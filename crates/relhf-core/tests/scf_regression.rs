use relhf_core::common::config::RunConfig;
use relhf_core::hf::{HartreeFock, HartreeFockReport};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Deserialize)]
struct ScfFixture {
    cases: Vec<ScfCase>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScfCase {
    id: String,
    config: serde_json::Value,
    orbitals: Vec<OrbitalReference>,
    core_energy: f64,
    core_energy_abs_tol: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrbitalReference {
    n: i32,
    kappa: i32,
    energy: f64,
    abs_tol: f64,
}

#[test]
fn self_consistent_orbital_energies_match_reference() {
    let fixture = load_fixture();
    let temp = TempDir::new().expect("tempdir should be created");

    for case in &fixture.cases {
        let config = write_and_load_config(&temp, case);
        let (hf, report) = run_case(&config, &case.id);
        assert!(report.converged(), "{}: SCF did not converge", case.id);

        for reference in &case.orbitals {
            let psi = hf
                .core()
                .iter()
                .chain(hf.valence())
                .find(|psi| psi.n == reference.n && psi.kappa == reference.kappa)
                .unwrap_or_else(|| {
                    panic!("{}: no orbital n={} kappa={}", case.id, reference.n, reference.kappa)
                });
            let label = format!("{} {}", case.id, psi.symbol());
            assert_scalar_close(&label, reference.energy, psi.en, reference.abs_tol, 0.0);
            assert_eq!(psi.count_nodes(), psi.required_nodes(), "{label}: node count");
            assert!((psi.norm2() - 1.0).abs() < 1.0e-8, "{label}: norm {}", psi.norm2());
        }

        assert_scalar_close(
            &format!("{} core energy", case.id),
            case.core_energy,
            report.core_energy,
            case.core_energy_abs_tol,
            0.0,
        );
    }
}

#[test]
fn core_orbitals_are_mutually_orthogonal() {
    let mut config = RunConfig::default();
    config.nucleus.z = 10;
    config.core = "[Ne]".to_string();
    let (hf, _) = run_case(&config, "neon");

    let core = hf.core();
    for (a, psi_a) in core.iter().enumerate() {
        for psi_b in core.iter().skip(a + 1).filter(|psi_b| psi_b.kappa == psi_a.kappa) {
            let overlap = psi_a.overlap(psi_b);
            assert!(
                overlap.abs() < 1.0e-6,
                "<{}|{}> = {overlap:.3e}",
                psi_a.symbol(),
                psi_b.symbol()
            );
        }
    }
}

#[test]
fn valence_orbital_is_orthogonal_to_core() {
    let mut config = RunConfig::default();
    config.nucleus.z = 11;
    config.core = "[Ne]".to_string();
    config.valence = "3s".to_string();
    let (hf, report) = run_case(&config, "sodium");

    let valence = &hf.valence()[0];
    for psi in hf.core().iter().filter(|psi| psi.kappa == valence.kappa) {
        let overlap = valence.overlap(psi);
        assert!(overlap.abs() < 1.0e-8, "<3s|{}> = {overlap:.3e}", psi.symbol());
    }
    // Relativistic Dirac-Fock 3s of Na.
    assert_scalar_close("sodium 3s", -0.18203, valence.en, 3.0e-3, 0.0);
    assert_eq!(report.valence.len(), 1);
}

#[test]
fn approximate_exchange_stays_close_to_full_method() {
    let mut full = RunConfig::default();
    full.nucleus.z = 4;
    full.core = "1s2,2s2".to_string();
    let mut approx = full.clone();
    approx.hartree_fock.method = "ApproxHF".to_string();

    let (full_hf, full_report) = run_case(&full, "beryllium full");
    let (approx_hf, approx_report) = run_case(&approx, "beryllium approximate");
    assert!(full_report.core_refinement.is_some());
    assert!(approx_report.core_refinement.is_none());

    for (a, b) in full_hf.core().iter().zip(approx_hf.core()) {
        let label = format!("beryllium {}", a.symbol());
        assert_scalar_close(&label, a.en, b.en, 2.0e-2, 0.0);
    }
}

#[test]
fn neon_exact_exchange_refinement_completes() {
    let mut full = RunConfig::default();
    full.nucleus.z = 10;
    full.core = "[Ne]".to_string();
    let mut approx = full.clone();
    approx.hartree_fock.method = "ApproxHF".to_string();

    let (full_hf, full_report) = run_case(&full, "neon full");
    let (approx_hf, _) = run_case(&approx, "neon approximate");
    let refinement = full_report
        .core_refinement
        .as_ref()
        .expect("full method refines a multi-orbital core");
    assert!(refinement.iterations > 0);
    assert!(refinement.eps < 1.0e-5, "refinement eps {:.3e}", refinement.eps);

    for (a, b) in full_hf.core().iter().zip(approx_hf.core()) {
        let label = format!("neon {}", a.symbol());
        assert!(a.en < 0.0, "{label}: energy {}", a.en);
        assert_eq!(a.count_nodes(), a.required_nodes(), "{label}: node count");
        assert_scalar_close(&label, b.en, a.en, 5.0e-3, 1.0e-3);
    }
    assert_scalar_close("neon core energy", -128.6919, full_report.core_energy, 5.0e-2, 0.0);
}

fn run_case(config: &RunConfig, id: &str) -> (HartreeFock, HartreeFockReport) {
    let mut hf = HartreeFock::from_config(config)
        .unwrap_or_else(|error| panic!("{id}: engine setup failed: {error}"));
    let mut report = hf
        .run(&config.core)
        .unwrap_or_else(|error| panic!("{id}: core failed: {error}"));
    if !config.valence.is_empty() {
        report = hf
            .run_valence(&config.valence)
            .unwrap_or_else(|error| panic!("{id}: valence failed: {error}"));
    }
    (hf, report)
}

fn write_and_load_config(temp: &TempDir, case: &ScfCase) -> RunConfig {
    let path = temp.path().join(format!("{}.json", case.id));
    let source = serde_json::to_string_pretty(&case.config).expect("config should serialize");
    fs::write(&path, source).expect("config should be written");
    RunConfig::from_path(&path)
        .unwrap_or_else(|error| panic!("{}: config did not load: {error}", case.id))
}

fn load_fixture() -> ScfFixture {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("scf_reference.json");
    let source = fs::read_to_string(&path)
        .unwrap_or_else(|error| panic!("failed to read fixture '{}': {error}", path.display()));
    serde_json::from_str(&source)
        .unwrap_or_else(|error| panic!("failed to parse fixture '{}': {error}", path.display()))
}

fn assert_scalar_close(label: &str, expected: f64, actual: f64, abs_tol: f64, rel_tol: f64) {
    let abs_diff = (actual - expected).abs();
    let rel_diff = abs_diff / expected.abs().max(1.0);
    assert!(
        abs_diff <= abs_tol || rel_diff <= rel_tol,
        "{label}: expected={expected:.15e} actual={actual:.15e} abs_diff={abs_diff:.3e} rel_diff={rel_diff:.3e} abs_tol={abs_tol:.3e} rel_tol={rel_tol:.3e}"
    );
}
