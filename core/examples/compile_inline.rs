use tempo_core::{load_project, Config};

const SOURCE: &str = r#"
flows:
  main:
    - task: http
      in:
        url: https://example.com
      retry:
        times: 2
        delay: 1
    - log: done
"#;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let project = load_project("inline.yml", SOURCE, &config.compiler)?;

    for (name, process) in &project.processes {
        println!(
            "✓ Compiled flow '{}' (version: {}, {} elements)",
            name,
            project.short_version(),
            process.elements.len()
        );
    }
    Ok(())
}
