use std::path::Path;

use warpgrid_cpuset::{CpuPlanner, DefaultSolver, Plan, PlannerConfig, Workload};

pub fn plan(
    config: Option<&Path>,
    workloads: &Path,
    threads: usize,
    sockets: usize,
    previous: Option<&Path>,
    format: &str,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => PlannerConfig::from_file(path)?,
        None => PlannerConfig::default(),
    };
    let workloads = read_workloads(workloads)?;
    let previous = match previous {
        Some(path) => Some(read_plan(path)?),
        None => None,
    };

    let planner = CpuPlanner::new(config, DefaultSolver::default());
    let plan = planner.plan(&workloads, threads, sockets, previous.as_ref())?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&plan)?),
        _ => print!("{}", format_plan(&plan)),
    }
    Ok(())
}

pub fn read_workloads(path: &Path) -> anyhow::Result<Vec<Workload>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn read_plan(path: &Path) -> anyhow::Result<Plan> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn format_plan(plan: &Plan) -> String {
    let mut out = format!(
        "allocator: {:?}, {} threads on {} socket(s)\n",
        plan.allocator, plan.total_threads, plan.sockets
    )
    .to_lowercase();
    let width = plan
        .placements
        .iter()
        .map(|p| p.workload_id.len())
        .max()
        .unwrap_or(0);
    for p in &plan.placements {
        let cpus = if p.cpu_list.is_empty() { "-" } else { p.cpu_list.as_str() };
        out.push_str(&format!("  {:<width$}  {cpus}\n", p.workload_id));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgrid_cpuset::{AllocatorKind, Placement};

    #[test]
    fn reads_workload_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workloads.json");
        std::fs::write(&path, r#"[{"id": "db", "request": 4}, {"id": "web", "request": 2}]"#).unwrap();

        let workloads = read_workloads(&path).unwrap();
        assert_eq!(workloads, vec![Workload::new("db", 4), Workload::new("web", 2)]);
    }

    #[test]
    fn formats_plan_table() {
        let plan = Plan {
            allocator: AllocatorKind::Greedy,
            total_threads: 8,
            sockets: 2,
            placements: vec![
                Placement {
                    workload_id: "db".into(),
                    threads: vec![0, 1, 2, 3],
                    cpu_list: "0-3".into(),
                },
                Placement {
                    workload_id: "idle".into(),
                    threads: vec![],
                    cpu_list: String::new(),
                },
            ],
        };
        assert_eq!(
            format_plan(&plan),
            "allocator: greedy, 8 threads on 2 socket(s)\n  db    0-3\n  idle  -\n"
        );
    }

    #[test]
    fn plan_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let plan = Plan {
            allocator: AllocatorKind::Exact,
            total_threads: 4,
            sockets: 1,
            placements: vec![Placement {
                workload_id: "a".into(),
                threads: vec![0, 1],
                cpu_list: "0-1".into(),
            }],
        };
        std::fs::write(&path, serde_json::to_string(&plan).unwrap()).unwrap();
        assert_eq!(read_plan(&path).unwrap(), plan);
    }
}
