//! Category and profile handlers.

use anyhow::{Context, Result};
use bizdir_core::backend::{Backend, RestBackend};
use bizdir_core::media::{self, ImageKind};
use bizdir_core::profile::{CategorySelections, Coordinates, ProfileDraft};

#[derive(clap::Args, Debug)]
pub struct CreateArgs {
    #[arg(long = "full-name")]
    full_name: String,
    #[arg(long)]
    bio: Option<String>,
    #[arg(long)]
    profession: Option<String>,
    #[arg(long)]
    website: Option<String>,
    #[arg(long = "picture-url")]
    picture_url: Option<String>,
    #[arg(long = "cover-url")]
    cover_url: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    whatsapp: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    facebook: Option<String>,
    #[arg(long)]
    linkedin: Option<String>,
    #[arg(long)]
    instagram: Option<String>,
    #[arg(long, requires = "long", allow_hyphen_values = true)]
    lat: Option<String>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    long: Option<String>,
    /// Category id (defaults to the selected category)
    #[arg(long)]
    category: Option<String>,
}

pub async fn categories(backend: &RestBackend) -> Result<()> {
    let categories = backend.list_categories().await.context("list categories")?;
    if categories.is_empty() {
        println!("No categories found.");
        return Ok(());
    }
    for category in categories {
        println!("{}  {}", category.category_id, category.name);
    }
    Ok(())
}

pub async fn select_category(backend: &RestBackend, choice: &str) -> Result<()> {
    let identity = backend.current_user().await.context("fetch user")?;
    let categories = backend.list_categories().await.context("list categories")?;
    let choice = choice.trim();
    let category = categories
        .into_iter()
        .find(|c| c.category_id == choice || c.name.eq_ignore_ascii_case(choice))
        .with_context(|| format!("Unknown category: {choice}"))?;

    let path = CategorySelections::default_path();
    let mut selections = CategorySelections::load(&path)?;
    println!("Selected {}", category.name);
    selections.set(&identity.id, category);
    selections.save(&path)
}

pub async fn list(backend: &RestBackend) -> Result<()> {
    let profiles = backend.list_profiles().await.context("list profiles")?;
    if profiles.is_empty() {
        println!("No profiles found.");
        return Ok(());
    }
    for profile in profiles {
        let profession = profile.profession.as_deref().unwrap_or("-");
        println!("{}  {}  {}", profile.profile_id, profile.full_name, profession);
    }
    Ok(())
}

pub async fn create(backend: &RestBackend, args: CreateArgs) -> Result<()> {
    let location = match (&args.lat, &args.long) {
        (Some(lat), Some(long)) => Some(Coordinates::parse(lat, long)?),
        _ => None,
    };

    let mut draft = ProfileDraft {
        full_name: args.full_name,
        bio: args.bio,
        profession: args.profession,
        website_url: args.website,
        profile_picture_url: args.picture_url,
        cover_img_url: args.cover_url,
        phn_no: args.phone,
        whatsapp_no: args.whatsapp,
        email: args.email,
        facebook_url: args.facebook,
        linkedin_url: args.linkedin,
        instagram_url: args.instagram,
        location,
        category_id: args.category,
    };
    draft.validate()?;

    if draft.category_id.is_none() {
        let identity = backend.current_user().await.context("fetch user")?;
        let selections = CategorySelections::load(&CategorySelections::default_path())?;
        draft.category_id = selections
            .get(&identity.id)
            .map(|c| c.category_id.clone());
    }

    let row = backend
        .insert_profile(&draft)
        .await
        .context("create profile")?;
    println!("Created profile {}", row.id);
    Ok(())
}

pub async fn upload_image(
    backend: &RestBackend,
    path: &str,
    kind: ImageKind,
    set: bool,
) -> Result<()> {
    let upload = media::load_image(path)?;
    let identity = backend.current_user().await.context("fetch user")?;
    let key = media::object_key(&identity.id, kind, upload.extension);
    let url = backend
        .upload_object(&key, upload.bytes, upload.mime)
        .await
        .context("upload image")?;

    if set {
        backend
            .update_profile_field(kind.column(), &url)
            .await
            .context("update profile")?;
    }
    println!("{url}");
    Ok(())
}
