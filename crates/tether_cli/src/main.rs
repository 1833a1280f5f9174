// Export a JSON host scene into a renderer scene graph and print what was built.
// Run with: cargo run --bin tether -- <scene.json> [edits.json] [--mode final|interactive|viewport]

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tether_core::{load_scene_json, Collection, EntityId, Material, Object, Scene};
use tether_sg::{NodeKind, SgGraph, SgScene};
use tether_sync::{Notification, RenderMode, SceneSync, SessionConfig, SessionContext, SyncReport};

/// One batch of host edits followed by the notifications the host would send.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EditBatch {
    label: Option<String>,
    frame: Option<i32>,
    /// Objects added, or replaced when the id already exists
    objects: Vec<Object>,
    materials: Vec<Material>,
    collections: Vec<Collection>,
    remove: Vec<EntityId>,
    notify: Vec<Notification>,
}

impl EditBatch {
    fn apply(&self, scene: &mut Scene) {
        if let Some(frame) = self.frame {
            scene.frame_current = frame;
        }
        for id in &self.remove {
            if scene.remove_object(*id).is_none() {
                log::warn!("Edit removes unknown object {}", id);
            }
        }
        for ob in &self.objects {
            match scene.object_mut(ob.id) {
                Some(existing) => *existing = ob.clone(),
                None => {
                    scene.add_object(ob.clone());
                }
            }
        }
        for mat in &self.materials {
            match scene.material_mut(mat.id) {
                Some(existing) => *existing = mat.clone(),
                None => {
                    scene.add_material(mat.clone());
                }
            }
        }
        for col in &self.collections {
            match scene.collections.iter_mut().find(|c| c.id == col.id) {
                Some(existing) => *existing = col.clone(),
                None => scene.collections.push(col.clone()),
            }
        }
    }
}

struct Args {
    scene: String,
    edits: Option<String>,
    mode: RenderMode,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <scene.json> [edits.json] [--mode final|interactive|viewport]",
            args[0]
        );
        std::process::exit(1);
    }

    let mut scene = None;
    let mut edits = None;
    let mut mode = RenderMode::Final;
    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        if arg == "--mode" {
            let value = rest.next().context("--mode needs a value")?;
            mode = match value.as_str() {
                "final" => RenderMode::Final,
                "interactive" => RenderMode::Interactive,
                "viewport" => RenderMode::Viewport,
                other => bail!("Unknown mode '{}'", other),
            };
        } else if scene.is_none() {
            scene = Some(arg.clone());
        } else if edits.is_none() {
            edits = Some(arg.clone());
        } else {
            bail!("Unexpected argument '{}'", arg);
        }
    }

    Ok(Args {
        scene: scene.context("No scene file given")?,
        edits,
        mode,
    })
}

fn load_edits(path: &Path) -> Result<Vec<EditBatch>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_report(title: &str, report: &SyncReport) {
    println!("\n=== {} ===", title);
    println!("{}", report);
    for err in &report.errors {
        println!("  error: {}", err);
    }
}

fn print_graph(graph: &SgGraph) {
    const KINDS: [NodeKind; 11] = [
        NodeKind::Group,
        NodeKind::Mesh,
        NodeKind::Points,
        NodeKind::Curves,
        NodeKind::Quadric,
        NodeKind::Volume,
        NodeKind::Procedural,
        NodeKind::Blobby,
        NodeKind::AnalyticLight,
        NodeKind::Camera,
        NodeKind::Material,
    ];

    println!("\nScene graph: {} node(s)", graph.len());
    for kind in KINDS {
        let count = graph.count_kind(kind);
        if count > 0 {
            println!("  {:?}: {}", kind, count);
        }
    }
    println!("  coordinate systems: {}", graph.coordinate_systems().len());
    if let Some(integrator) = graph.integrator() {
        println!("  integrator: {}", integrator.plugin);
    }
    println!("  display channels: {}", graph.channels().len());

    let dangling = graph.dangling_links();
    if !dangling.is_empty() {
        println!("  dangling links:");
        for link in dangling {
            println!("    {}", link);
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args = parse_args()?;
    let mut scene = load_scene_json(&args.scene).with_context(|| format!("Failed to load {}", args.scene))?;
    log::info!(
        "Loaded '{}': {} object(s), {} material(s), frame {}",
        scene.name,
        scene.objects.len(),
        scene.materials.len(),
        scene.frame_current
    );

    let config = SessionConfig {
        mode: args.mode,
        ..Default::default()
    };
    let session = SessionContext::new(config)?;
    let sg = Arc::new(SgScene::new());
    let mut sync = SceneSync::new(session, sg.clone());

    let report = sync.export(&mut scene)?;
    print_report("Export", &report);
    println!("Instances: {}", sync.mirror().instance_count());
    print_graph(&sg.read());

    if let Some(path) = args.edits {
        let batches = load_edits(Path::new(&path))?;
        log::info!("Replaying {} edit batch(es)", batches.len());
        for (i, batch) in batches.iter().enumerate() {
            batch.apply(&mut scene);
            let report = sync.update_scene(&scene, &batch.notify)?;
            let title = batch.label.clone().unwrap_or_else(|| format!("Batch {}", i));
            print_report(&title, &report);

            let textures = sync.poll_textures(&scene)?;
            if !textures.updated.is_empty() || !textures.errors.is_empty() {
                print_report("Textures", &textures);
            }
        }
        println!("Instances: {}", sync.mirror().instance_count());
        print_graph(&sg.read());
    }

    sync.stop();
    Ok(())
}
