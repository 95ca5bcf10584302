use std::io::Read;

use clap::Parser;
use docplug::cli::Cli;
use docplug::compiler;
use docplug::error::{DocplugError, DocplugResult};
use docplug::pipeline::{self, Coordinator};
use docplug::store::mongo_wire::MongoWireStore;
use docplug::store::{Namespace, Session, Store};

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(summary) => {
            if let Some(line) = summary {
                println!("{}", line);
            }
        }
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            let code = match e {
                DocplugError::InvalidArgs(_) => 2,
                _ => 1,
            };
            std::process::exit(code);
        }
    }
}

fn run(cli: Cli) -> DocplugResult<Option<String>> {
    if cli.username.is_some() || cli.password.is_some() {
        log::warn!(
            "the reference MongoDB wire adapter does not implement authentication; \
             --username/--password are accepted but ignored"
        );
    }

    if cli.write_concern.trim().is_empty() {
        return Err(DocplugError::InvalidArgs("write-concern".to_string()));
    }

    let template_text = read_template(cli.template.as_deref())?;
    let plug = compiler::compile(&template_text)?;

    let namespace = Namespace::new(cli.db.clone(), cli.collection.clone());
    let store = MongoWireStore::new(cli.host.clone(), cli.port);

    if cli.drop {
        let mut session = store.open_session(&namespace)?;
        session.drop_collection()?;
    }

    let coordinator = Coordinator {
        plug,
        target: cli.num,
        num_workers: cli.num_insertion_workers,
        channel_capacity: pipeline::DEFAULT_CHANNEL_CAPACITY,
        bulk_buffer_size: cli.bulk_buffer_size,
        stop_on_error: cli.stop_on_error,
        write_concern: cli.write_concern.clone(),
    };

    let outcome = coordinator.run(&store, &namespace);
    let summary = (!cli.quiet).then(|| format!("inserted {} document(s)", outcome.inserted));

    match outcome.error {
        Some(e) => {
            if let Some(line) = &summary {
                println!("{}", line);
            }
            Err(e)
        }
        None => Ok(summary),
    }
}

/// Resolves the template argument: an existing readable file is read as
/// the template text; otherwise the argument itself is the template text;
/// if absent, the template is read from standard input.
fn read_template(arg: Option<&str>) -> DocplugResult<String> {
    match arg {
        Some(text_or_path) => {
            let path = std::path::Path::new(text_or_path);
            if path.is_file() {
                std::fs::read_to_string(path).map_err(DocplugError::from)
            } else {
                Ok(text_or_path.to_string())
            }
        }
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}
