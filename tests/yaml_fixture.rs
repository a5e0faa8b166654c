//! Confirms `EnvironmentDoc` derives a plain `serde::Deserialize` impl with
//! no hidden JSON-only assumptions: a loader can hand this crate a document
//! parsed from YAML just as well as from JSON.

use maestro_core::model::environment::EnvironmentDoc;
use maestro_core::model::Environment;

const DOC: &str = r#"
__maestro:
  schema: 2
ships:
  - name: fleet-a
    address: 10.0.0.1
registries: []
services:
  - name: db
    image: postgres:16
    instances:
      - name: db-1
        ship: fleet-a
  - name: web
    image: web:latest
    requires: [db]
    instances:
      - name: web-1
        ship: fleet-a
        ports:
          - name: http
            external: { port: 8080 }
            internal: { port: 80 }
        volumes: ["/srv/web:/data"]
"#;

#[test]
fn yaml_document_deserializes_and_validates() {
    let doc: EnvironmentDoc = serde_yaml::from_str(DOC).unwrap();
    let environment = Environment::new(doc).unwrap();

    assert_eq!(environment.ships.len(), 1);
    assert_eq!(environment.instances.len(), 2);
    assert_eq!(
        environment.graph.hard_dependencies("web"),
        vec!["db".to_string()]
    );

    let web = environment.instance("web-1").unwrap();
    assert_eq!(web.volumes.len(), 1);
    assert_eq!(web.volumes[0].host_path, "/srv/web");
    assert_eq!(web.volumes[0].container_path, "/data");
}
