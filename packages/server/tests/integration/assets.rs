use serde_json::json;

use crate::common::{TestApp, routes};

mod create {
    use super::*;

    #[tokio::test]
    async fn json_create_defaults_provenance() {
        let app = TestApp::spawn().await;
        let res = app
            .create_json(json!({
                "id": "MM001",
                "patientId": "P001",
                "modality": "text",
                "textContent": "Patient reports mild headache.",
            }))
            .await;

        assert_eq!(res.body["id"], "MM001");
        assert!(res.body["filePath"].is_null());
        assert!(res.body["fileUrl"].is_null());

        let list = app.get(routes::ASSETS).await;
        assert_eq!(list.status, 200);
        let asset = &list.body[0];
        assert_eq!(asset["sourceTable"], "Upload");
        assert_eq!(asset["sourcePk"], "MM001");
        assert_eq!(asset["textContent"], "Patient reports mild headache.");
        assert!(asset["createdAt"].as_str().is_some());
    }

    #[tokio::test]
    async fn file_part_without_filename_is_not_an_upload() {
        let app = TestApp::spawn().await;
        let res = app
            .upload(
                routes::ASSETS,
                &[("id", "MM001"), ("modality", "other"), ("filePath", "other/x.bin")],
                Some(("", Vec::new())),
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text());
        assert_eq!(res.body["filePath"], "other/x.bin");
        let stored: Vec<_> = std::fs::read_dir(app.storage_root.join("other"))
            .unwrap()
            .collect();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn missing_id_or_modality_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .post_json(routes::ASSETS, &json!({ "modality": "image" }))
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");

        let res = app
            .upload(routes::ASSETS, &[("id", "MM001")], Some(("a.png", b"png".to_vec())))
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");

        let list = app.get(routes::ASSETS).await;
        assert_eq!(list.body.as_array().unwrap().len(), 0);
        assert_eq!(std::fs::read_dir(app.storage_root.join("image")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let app = TestApp::spawn().await;
        let res = app
            .client
            .post(format!("http://{}{}", app.addr, routes::ASSETS))
            .header("Content-Type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(res.status().as_u16(), 400);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn upload_round_trip_preserves_bytes() {
        let app = TestApp::spawn().await;
        let payload = b"%PDF-1.7\n binary \x00\x01\x02 tail".to_vec();
        let res = app
            .create_with_file("MM001", "pdf", "report.PDF", &payload)
            .await;

        assert_eq!(res.body["fileFormat"], "pdf");
        assert_eq!(res.body["filePath"], "pdf/report.PDF");
        assert_eq!(res.body["fileUrl"], "/assets/MM001/file");
        assert!(app.storage_root.join("pdf/report.PDF").is_file());

        let file = app.get(&routes::asset_file("MM001")).await;
        assert_eq!(file.status, 200);
        assert_eq!(file.header("content-type"), Some("application/pdf"));
        assert_eq!(
            file.header("content-length"),
            Some(payload.len().to_string().as_str())
        );
        assert!(
            file.header("content-disposition")
                .is_some_and(|v| v.starts_with("inline;"))
        );
        assert_eq!(file.bytes, payload);
    }

    #[tokio::test]
    async fn multipart_metadata_fields_are_stored() {
        let app = TestApp::spawn().await;
        let res = app
            .upload(
                routes::ASSETS,
                &[
                    ("id", "MM001"),
                    ("modality", "image"),
                    ("patientId", "P001"),
                    ("recordId", "R001"),
                    ("sourceTable", "imaging_study"),
                    ("sourcePk", "IS9"),
                    ("description", "Chest X-ray"),
                ],
                Some(("chest xray.png", b"PNG".to_vec())),
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text());
        assert_eq!(res.body["filePath"], "image/chest_xray.png");

        let list = app.get(&format!("{}?patientId=P001", routes::ASSETS)).await;
        let asset = &list.body[0];
        assert_eq!(asset["recordId"], "R001");
        assert_eq!(asset["sourceTable"], "imaging_study");
        assert_eq!(asset["sourcePk"], "IS9");
        assert_eq!(asset["description"], "Chest X-ray");
        assert_eq!(asset["fileFormat"], "png");
    }

    #[tokio::test]
    async fn multipart_without_file_creates_metadata_only() {
        let app = TestApp::spawn().await;
        let res = app
            .upload(routes::ASSETS, &[("id", "MM001"), ("modality", "text")], None)
            .await;

        assert_eq!(res.status, 201, "{}", res.text());
        assert!(res.body["filePath"].is_null());
    }

    #[tokio::test]
    async fn unknown_modality_lands_in_other_bucket() {
        let app = TestApp::spawn().await;
        let res = app
            .create_with_file("MM001", "genomics", "seq.fasta", b"ACGT")
            .await;

        assert_eq!(res.body["filePath"], "other/seq.fasta");
        let list = app.get(routes::ASSETS).await;
        assert_eq!(list.body[0]["modality"], "genomics");
    }

    #[tokio::test]
    async fn traversal_filename_is_rejected_and_nothing_written() {
        let app = TestApp::spawn().await;

        for name in ["../../etc/passwd", "/etc/passwd", "C:\\Windows\\win.ini"] {
            let res = app
                .upload(
                    routes::ASSETS,
                    &[("id", "MM001"), ("modality", "image")],
                    Some((name, b"evil".to_vec())),
                )
                .await;
            assert_eq!(res.status, 400, "{name}: {}", res.text());
            assert_eq!(res.error_code(), "VALIDATION_ERROR");
        }

        let list = app.get(routes::ASSETS).await;
        assert_eq!(list.body.as_array().unwrap().len(), 0);
        assert_eq!(std::fs::read_dir(app.storage_root.join("image")).unwrap().count(), 0);
        assert!(
            !app.storage_root
                .parent()
                .unwrap()
                .join("etc/passwd")
                .exists()
        );
    }

    #[tokio::test]
    async fn duplicate_id_conflicts_and_keeps_original() {
        let app = TestApp::spawn().await;
        app.create_with_file("MM001", "image", "scan.png", b"original")
            .await;

        let res = app
            .upload(
                routes::ASSETS,
                &[("id", "MM001"), ("modality", "image")],
                Some(("scan.png", b"intruder".to_vec())),
            )
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.error_code(), "CONFLICT");

        let file = app.get(&routes::asset_file("MM001")).await;
        assert_eq!(file.bytes, b"original");
        assert_eq!(std::fs::read_dir(app.storage_root.join("image")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn same_filename_for_different_assets_does_not_overwrite() {
        let app = TestApp::spawn().await;
        let first = app
            .create_with_file("A", "image", "scan.png", b"first")
            .await;
        let second = app
            .create_with_file("B", "image", "scan.png", b"second")
            .await;

        assert_ne!(first.body["filePath"], second.body["filePath"]);
        assert_eq!(app.get(&routes::asset_file("A")).await.bytes, b"first");
        assert_eq!(app.get(&routes::asset_file("B")).await.bytes, b"second");
    }

    #[tokio::test]
    async fn oversize_upload_is_rejected() {
        let app = TestApp::spawn_with_limit(1024).await;
        let res = app
            .upload(
                routes::ASSETS,
                &[("id", "MM001"), ("modality", "video")],
                Some(("clip.mp4", vec![0u8; 4096])),
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
        assert_eq!(std::fs::read_dir(app.storage_root.join("video")).unwrap().count(), 0);
    }
}

mod list {
    use super::*;

    async fn seed(app: &TestApp) {
        for (id, modality, patient) in [("A", "image", "P1"), ("B", "image", "P2"), ("C", "audio", "P1")] {
            app.create_json(json!({ "id": id, "modality": modality, "patientId": patient }))
                .await;
        }
    }

    fn ids(body: &serde_json::Value) -> Vec<String> {
        let mut ids: Vec<String> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn filters_by_modality_and_patient() {
        let app = TestApp::spawn().await;
        seed(&app).await;

        let res = app
            .get(&format!("{}?modality=image&patientId=P1", routes::ASSETS))
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(ids(&res.body), vec!["A"]);

        let res = app.get(&format!("{}?modality=image", routes::ASSETS)).await;
        assert_eq!(ids(&res.body), vec!["A", "B"]);

        let res = app.get(&format!("{}?patientId=P1", routes::ASSETS)).await;
        assert_eq!(ids(&res.body), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn empty_filters_are_ignored() {
        let app = TestApp::spawn().await;
        seed(&app).await;

        let res = app
            .get(&format!("{}?modality=&patientId=", routes::ASSETS))
            .await;
        assert_eq!(ids(&res.body), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn file_url_is_set_only_for_assets_with_files() {
        let app = TestApp::spawn().await;
        app.create_with_file("withfile", "image", "a.png", b"x").await;
        app.create_json(json!({ "id": "nofile", "modality": "text" }))
            .await;

        let res = app.get(routes::ASSETS).await;
        for asset in res.body.as_array().unwrap() {
            match asset["id"].as_str().unwrap() {
                "withfile" => assert_eq!(asset["fileUrl"], "/assets/withfile/file"),
                _ => assert!(asset["fileUrl"].is_null()),
            }
        }
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn delete_removes_row_and_file() {
        let app = TestApp::spawn().await;
        app.create_with_file("MM001", "audio", "heart.wav", b"RIFF")
            .await;

        let res = app.delete(&routes::asset("MM001")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["deleted"], true);
        assert_eq!(res.body["fileRemoval"], "removed");
        assert!(!app.storage_root.join("audio/heart.wav").exists());

        let file = app.get(&routes::asset_file("MM001")).await;
        assert_eq!(file.status, 404);
        assert_eq!(file.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn delete_succeeds_when_file_already_gone() {
        let app = TestApp::spawn().await;
        app.create_with_file("MM001", "audio", "heart.wav", b"RIFF")
            .await;
        std::fs::remove_file(app.storage_root.join("audio/heart.wav")).unwrap();

        let res = app.delete(&routes::asset("MM001")).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["fileRemoval"], "already_absent");
    }

    #[tokio::test]
    async fn delete_metadata_only_asset() {
        let app = TestApp::spawn().await;
        app.create_json(json!({ "id": "MM001", "modality": "text" }))
            .await;

        let res = app.delete(&routes::asset("MM001")).await;
        assert_eq!(res.status, 200);
        assert!(res.body["fileRemoval"].is_null());
    }

    #[tokio::test]
    async fn delete_unknown_is_not_found() {
        let app = TestApp::spawn().await;
        let res = app.delete(&routes::asset("missing")).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn second_delete_is_not_found() {
        let app = TestApp::spawn().await;
        app.create_json(json!({ "id": "MM001", "modality": "text" }))
            .await;

        assert_eq!(app.delete(&routes::asset("MM001")).await.status, 200);
        assert_eq!(app.delete(&routes::asset("MM001")).await.status, 404);
    }
}

mod fetch {
    use meddata_server::repository::{AssetRepository, NewAsset, SeaOrmAssetRepository};

    use super::*;

    #[tokio::test]
    async fn unknown_asset_is_not_found() {
        let app = TestApp::spawn().await;
        let res = app.get(&routes::asset_file("missing")).await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn asset_without_file_is_not_found() {
        let app = TestApp::spawn().await;
        app.create_json(json!({ "id": "MM001", "modality": "text" }))
            .await;

        let res = app.get(&routes::asset_file("MM001")).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn file_deleted_out_of_band_is_not_found() {
        let app = TestApp::spawn().await;
        app.create_with_file("MM001", "image", "scan.png", b"png")
            .await;
        std::fs::remove_file(app.storage_root.join("image/scan.png")).unwrap();

        let res = app.get(&routes::asset_file("MM001")).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn reference_only_create_resolves_once_file_exists() {
        let app = TestApp::spawn().await;
        let res = app
            .create_json(json!({
                "id": "MM001",
                "modality": "other",
                "filePath": "other/x.bin",
                "fileFormat": "bin",
            }))
            .await;
        assert_eq!(res.body["filePath"], "other/x.bin");
        assert_eq!(res.body["fileUrl"], "/assets/MM001/file");
        assert!(!app.storage_root.join("other/x.bin").exists());

        assert_eq!(app.get(&routes::asset_file("MM001")).await.status, 404);

        std::fs::write(app.storage_root.join("other/x.bin"), b"late arrival").unwrap();
        let file = app.get(&routes::asset_file("MM001")).await;
        assert_eq!(file.status, 200);
        assert_eq!(file.bytes, b"late arrival");
    }

    #[tokio::test]
    async fn legacy_absolute_path_inside_root_is_served() {
        let app = TestApp::spawn().await;
        let absolute = app.storage_root.join("timeseries/ecg.csv");
        std::fs::write(&absolute, b"t,mv\n0,1.2\n").unwrap();

        app.create_json(json!({
            "id": "MM001",
            "modality": "timeseries",
            "filePath": absolute.to_string_lossy(),
            "fileFormat": "csv",
        }))
        .await;

        let file = app.get(&routes::asset_file("MM001")).await;
        assert_eq!(file.status, 200);
        assert_eq!(file.header("content-type"), Some("text/csv"));
        assert_eq!(file.bytes, b"t,mv\n0,1.2\n");
    }

    #[tokio::test]
    async fn reference_outside_root_is_rejected_at_create() {
        let app = TestApp::spawn().await;
        let outside = app.storage_root.parent().unwrap().join("secret.txt");
        std::fs::write(&outside, b"top secret").unwrap();

        for (id, path) in [
            ("rel", "../secret.txt".to_string()),
            ("abs", outside.to_string_lossy().into_owned()),
        ] {
            let res = app
                .post_json(
                    routes::ASSETS,
                    &json!({ "id": id, "modality": "other", "filePath": path }),
                )
                .await;
            assert_eq!(res.status, 400, "{id}: {}", res.text());
            assert_eq!(res.error_code(), "VALIDATION_ERROR");
        }

        let list = app.get(routes::ASSETS).await;
        assert_eq!(list.body, json!([]));
    }

    #[tokio::test]
    async fn tampered_row_outside_root_is_refused() {
        let app = TestApp::spawn().await;
        let outside = app.storage_root.parent().unwrap().join("secret.txt");
        std::fs::write(&outside, b"top secret").unwrap();

        let repo = SeaOrmAssetRepository::new(app.db.clone());
        for (id, path) in [
            ("rel", "../secret.txt".to_string()),
            ("abs", outside.to_string_lossy().into_owned()),
        ] {
            repo.insert(NewAsset {
                id: id.into(),
                patient_id: None,
                record_id: None,
                source_table: "Upload".into(),
                source_pk: Some(id.into()),
                modality: "other".into(),
                text_content: None,
                file_path: Some(path),
                file_format: None,
                description: None,
            })
            .await
            .unwrap();
        }

        for id in ["rel", "abs"] {
            let res = app.get(&routes::asset_file(id)).await;
            assert_eq!(res.status, 400, "{id}: {}", res.text());
            assert_ne!(res.bytes, b"top secret");
        }
    }

    #[tokio::test]
    async fn unknown_format_falls_back_to_octet_stream() {
        let app = TestApp::spawn().await;
        app.create_with_file("MM001", "other", "blob.zzzunknown", b"??")
            .await;

        let file = app.get(&routes::asset_file("MM001")).await;
        assert_eq!(file.status, 200);
        assert_eq!(file.header("content-type"), Some("application/octet-stream"));
    }
}
