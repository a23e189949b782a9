use relief_format::*;
use relief_kernel::HeightGrid;
use relief_pipeline::{
    run_batch, CancelToken, CutMode, PipelineConfig, PipelineError, TerrainSource, TileInput, TileRun,
};
use relief_types::Point2;

fn tile(name: &str) -> TileInput {
    let grid = HeightGrid::from_fn(Point2::origin(), 5.0, 5, 5, |x, _| 2.0 + 0.1 * x).unwrap();
    TileInput::new(name, TerrainSource::Grid(grid))
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::new();
    config.base.thickness = 4.0;
    config.base.cut = CutMode::Manual { elevation: 0.0 };
    config.deboss.enabled = false;
    config
}

// ── Job files ────────────────────────────────────────────────────────────

#[test]
fn job_round_trips_through_json() {
    let job = JobFile::new(config(), vec![tile("north"), tile("south")]);
    let text = save_job(&job).unwrap();
    assert!(text.contains("\"format\": \"relief-job\""));
    assert_eq!(load_job(&text).unwrap(), job);
}

#[test]
fn job_with_wrong_format_is_rejected() {
    let mut job = JobFile::new(config(), vec![]);
    job.format = "something-else".into();
    let err = load_job(&save_job(&job).unwrap()).unwrap_err();
    assert_eq!(err, FormatError::UnknownFormat("something-else".into()));
}

#[test]
fn job_from_the_future_is_rejected() {
    let mut job = JobFile::new(config(), vec![]);
    job.version = JOB_VERSION + 1;
    let err = load_job(&save_job(&job).unwrap()).unwrap_err();
    assert!(matches!(err, FormatError::FutureVersion { file_version, .. } if file_version == JOB_VERSION + 1));
}

#[test]
fn job_without_config_uses_defaults() {
    let json = r#"{ "format": "relief-job", "version": 1, "tiles": [] }"#;
    let job = load_job(json).unwrap();
    assert_eq!(job.config, PipelineConfig::default());
}

// ── Outputs ──────────────────────────────────────────────────────────────

#[test]
fn terrain_exports_as_binary_stl() {
    let config = config();
    let out = TileRun::new(&config).unwrap().run(&tile("stl")).unwrap();
    let bytes = binary_stl(&out.terrain, "stl_terrain").unwrap();
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    assert_eq!(count, out.terrain.triangle_count());
    assert_eq!(bytes.len(), 84 + 50 * count);
}

#[test]
fn manifest_records_files_and_failures() {
    let config = config();
    let inputs = vec![
        Ok(tile("a")),
        Err(PipelineError::Load {
            tile: "b".into(),
            reason: "no raster".into(),
        }),
    ];
    let mut manifest = Manifest::new(uuid::Uuid::nil());
    let report = run_batch(&config, inputs, &CancelToken::new(), |out| {
        let files = out
            .solids()
            .into_iter()
            .map(|(category, mesh)| ManifestFile {
                category: category.to_string(),
                path: stl_file_name(&out.name, category),
                triangles: mesh.triangle_count(),
            })
            .collect();
        manifest.add_tile(out, files);
        Ok(())
    })
    .unwrap();
    manifest.finish(&report);

    assert_eq!(manifest.run_id, report.run_id);
    assert_eq!(manifest.tiles.len(), 1);
    assert_eq!(manifest.tiles[0].files[0].path, "a_terrain.stl");
    assert!(manifest.triangle_total() > 0);
    assert_eq!(manifest.failures.len(), 1);
    assert_eq!(manifest.failures[0].name, "b");

    let json = manifest.to_json().unwrap();
    let back: Manifest = serde_json::from_str(&json).unwrap();
    assert_eq!(back, manifest);
}

#[test]
fn file_names_are_sanitised() {
    assert_eq!(stl_file_name("Mt. Hood 1/2", "roads"), "Mt__Hood_1_2_roads.stl");
}
