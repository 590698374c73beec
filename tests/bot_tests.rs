use wb_position_bot::bot::{
    format_keyword_results, format_keyword_results_text, format_product_caption,
    format_product_text,
};
use wb_position_bot::localization::init_localization;
use wb_position_bot::models::{ProductDetails, SearchResult};

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() {
        // Initialize localization if not already done
        let _ = init_localization();
    }

    fn sample_product() -> ProductDetails {
        ProductDetails {
            id: 182803851,
            name: "Платье летнее_миди".to_string(),
            brand: "Brand".to_string(),
            price: 2499.0,
            rating: 4.8,
            feedbacks: 120,
            image_url: "https://basket-12.wbbasket.ru/vol1828/part182803/182803851/images/c516x688/1.webp"
                .to_string(),
            url: "https://www.wildberries.ru/catalog/182803851/detail.aspx".to_string(),
        }
    }

    /// Test the MarkdownV2 product caption in Russian
    #[test]
    fn test_product_caption_ru() {
        setup_localization();

        let caption = format_product_caption(&sample_product(), Some("ru"));
        // MarkdownV2 allows escapes inside the bold entity
        assert!(caption.starts_with("*Платье летнее\\_миди*\n\n"));
        assert!(caption.contains("Бренд: Brand"));
        assert!(caption.contains("Цена: 2499 ₽"));
        assert!(caption.contains("Рейтинг: 4\\.8"));
        assert!(caption.contains("Отзывы: 120"));
        assert!(caption.contains(
            "[182803851](https://www.wildberries.ru/catalog/182803851/detail.aspx)"
        ));
        assert!(caption.ends_with("Результаты анализа:"));
    }

    /// Test the plain-text caption used when markup is rejected
    #[test]
    fn test_product_text_has_no_markup() {
        setup_localization();

        let mut product = sample_product();
        product.name = "Кеды *new* [2024]".to_string();
        let text = format_product_text(&product, Some("ru"));
        assert!(text.starts_with("Кеды *new* [2024]\n\n"));
        assert!(text.contains("Рейтинг: 4.8"));
        assert!(text.contains("ID: 182803851 (https://www.wildberries.ru/catalog/182803851/detail.aspx)"));
        assert!(!text.contains('\\'));
    }

    /// Test that a placeholder product omits the empty brand line
    #[test]
    fn test_product_caption_placeholder() {
        setup_localization();

        let product = ProductDetails::placeholder(42, String::new(), "link");
        let caption = format_product_caption(&product, Some("en"));
        assert!(caption.contains("Товар 42"));
        assert!(!caption.contains("Brand"));
        assert!(caption.contains("Price: 0 ₽"));
    }

    /// Test keyword results with found and missing positions
    #[test]
    fn test_keyword_results() {
        setup_localization();

        let results = vec![
            SearchResult {
                keyword: "платье летнее".to_string(),
                position: Some(12),
            },
            SearchResult {
                keyword: "сарафан".to_string(),
                position: None,
            },
        ];

        let ru = format_keyword_results(&results, 500, Some("ru"));
        assert!(ru.starts_with("*🔑 Найденные ключевые запросы и позиции:*"));
        assert!(ru.contains("1\\. платье летнее: позиция 12"));
        assert!(ru.contains("2\\. сарафан: ниже 500"));

        let en = format_keyword_results_text(&results, 300, Some("en"));
        assert!(en.contains("1. платье летнее: position 12"));
        assert!(en.contains("2. сарафан: below 300"));
    }
}
