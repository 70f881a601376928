//! Snapshot tests
//!
//! Loads each tests/fixtures/*.conf file on its own, overrides a few directives and compares the
//! rendered output.

use flywheel::cancel::Cancellation;
use flywheel::nginx::{self, BuildOptions, ParseOptions};
use flywheel::overrides::override_payload;
use flywheel::provider::{KeyRule, MapProvider};

#[test]
fn snapshots() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("FLYWHEEL_LOG"))
        .with_writer(std::io::stderr)
        .init();

    insta::glob!("fixtures/*.conf", |path| {
        let options = ParseOptions {
            single_file: true,
            ..Default::default()
        };
        let mut payload = nginx::parse(path, &options).unwrap();

        // keys relative to the fixture directory, e.g. `/nginx/listen`
        let fixtures = path.parent().unwrap().canonicalize().unwrap();
        let rule = KeyRule::new(fixtures.to_string_lossy().into_owned());
        let mut provider = MapProvider::new(rule);
        provider.insert("/nginx/user", vec!["nginx".into(), "nginx".into()]);
        provider.insert("/nginx/worker_processes", vec!["auto".into()]);
        provider.insert("/nginx/listen", vec!["8080".into()]);
        provider.insert("/proxy/client_max_body_size", vec!["64m".into()]);

        override_payload(&mut payload, &mut provider, &Cancellation::new()).unwrap();

        let rendered =
            nginx::build(&payload.config[0].parsed, &BuildOptions::default()).unwrap();
        insta::assert_snapshot!(rendered);
    });
}
