use distflow_algo::{BackendKind, SolverConfig};
use distflow_batch::{jobs_from_scales, run_batch, BatchManifest, BatchRunnerConfig};
use distflow_core::{
    BusType, Feeder, Kilovars, Kilovolts, Kilowatts, LineRecord, NodeId, NodeRecord, Ohms,
    VoltageLimits,
};
use tempfile::tempdir;

fn five_node() -> Feeder {
    let node = |id, bus_type, pd, qd| {
        NodeRecord::new(NodeId::new(id), bus_type, Kilowatts(pd), Kilovars(qd))
    };
    let line = |from, to, r, x| LineRecord::new(NodeId::new(from), NodeId::new(to), Ohms(r), Ohms(x));
    Feeder::from_records(
        vec![
            node(1, BusType::Slack, 0.0, 0.0),
            node(2, BusType::Load, 100.0, 60.0),
            node(3, BusType::Load, 90.0, 40.0),
            node(4, BusType::Load, 120.0, 80.0),
            node(5, BusType::Load, 60.0, 30.0),
        ],
        vec![
            line(1, 2, 0.922, 0.470),
            line(2, 3, 0.493, 0.251),
            line(3, 4, 0.366, 0.186),
            line(2, 5, 0.819, 0.707),
        ],
        VoltageLimits::from_base_kv(Kilovolts(11.0)),
    )
    .unwrap()
}

#[test]
fn load_scaling_batch_writes_manifest_and_reports() {
    let dir = tempdir().unwrap();
    let config = BatchRunnerConfig {
        feeder: five_node(),
        jobs: jobs_from_scales(&[0.5, 1.0, 40.0]),
        output_root: dir.path().join("sweep"),
        backend: BackendKind::InteriorPoint,
        solver: SolverConfig::default(),
        threads: 2,
    };

    let summary = run_batch(&config).unwrap();
    assert_eq!(summary.success, 2);
    assert_eq!(summary.failure, 1);
    assert!(summary.manifest_path.exists());

    let manifest = BatchManifest::load(&summary.manifest_path).unwrap();
    assert_eq!(manifest.num_jobs, 3);
    assert_eq!(manifest.task, "distflow-opf");
    assert_eq!(manifest.backend, BackendKind::InteriorPoint);
    assert_eq!(manifest.solver, SolverConfig::default());
    assert_eq!(manifest.base_feeder.lines, 4);
    assert_eq!(manifest.base_feeder.total_pd_kw, 370.0);
    assert_eq!(manifest.first_infeasible_scale(), Some(40.0));
    assert_eq!(manifest.loss_curve().len(), 2);

    // par_iter().collect() keeps job order
    let base = &manifest.jobs[1];
    assert_eq!(base.status, "ok");
    assert!((base.total_losses_kw.unwrap() - 5.27997).abs() < 1e-4);
    assert!(std::path::Path::new(&base.output).exists());

    let overloaded = &manifest.jobs[2];
    assert_eq!(overloaded.status, "error");
    assert_eq!(overloaded.error_kind.as_deref(), Some("infeasible"));

    let light = &manifest.jobs[0];
    assert!(light.total_losses_kw.unwrap() < base.total_losses_kw.unwrap());
}
